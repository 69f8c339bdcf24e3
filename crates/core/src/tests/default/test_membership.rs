use std::sync::Arc;

use crate::dht::NodeRef;
use crate::dht::NodeState;
use crate::dht::RingId;
use crate::dht::SuccessorReader;
use crate::discovery::StaticDiscoverer;
use crate::error::Result;
use crate::tests::default::node_ref;
use crate::tests::default::prepare_node_with_discoverer;
use crate::tests::default::prepare_stable_ring;
use crate::tests::default::stabilize_all;
use crate::tests::default::successor_ids;
use crate::transport::dummy::DummyHub;

#[tokio::test]
async fn test_election_converges_to_min_id() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;

    for s in swarms.iter() {
        assert_eq!(s.elector().elect().await?, node_ref(10));
    }
    for s in swarms.iter() {
        assert_eq!(s.dht().coordinator()?, Some(node_ref(10)));
    }
    Ok(())
}

#[tokio::test]
async fn test_reelect_when_coordinator_dies() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    for s in swarms.iter() {
        s.elector().check_coordinator().await?;
        assert_eq!(s.dht().coordinator()?, Some(node_ref(10)));
    }

    hub.kill("node10");
    let (b, c) = (&swarms[1], &swarms[2]);
    b.elector().check_coordinator().await?;
    assert_eq!(b.dht().coordinator()?, Some(node_ref(40)));

    // 90 still caches 10 until it pings it
    assert_eq!(c.dht().coordinator()?, Some(node_ref(10)));
    c.elector().check_coordinator().await?;
    assert_eq!(c.dht().coordinator()?, Some(node_ref(40)));
    Ok(())
}

#[tokio::test]
async fn test_coordinator_gossip() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, b) = (&swarms[0], &swarms[1]);

    // 40 believes in itself, its successor 90 knows better
    b.dht().set_coordinator(Some(node_ref(40)))?;
    swarms[2].dht().set_coordinator(Some(node_ref(10)))?;
    b.elector().check_coordinator().await?;
    assert_eq!(b.dht().coordinator()?, Some(node_ref(10)));

    // a dead gossiped coordinator is not adopted
    a.dht().set_coordinator(Some(node_ref(10)))?;
    b.dht().set_coordinator(Some(node_ref(40)))?;
    swarms[2].dht().set_coordinator(Some(NodeRef::new(RingId::from(5), "node5")))?;
    b.elector().check_coordinator().await?;
    assert_eq!(b.dht().coordinator()?, Some(node_ref(40)));
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_through_discovery() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;

    // identities of discovered peers are hints, ping tells the truth
    let discoverer = Arc::new(StaticDiscoverer::new(vec![
        NodeRef::new(RingId::from(0), "node50"),
        NodeRef::new(RingId::from(0), "node404"),
        NodeRef::new(RingId::from(0), "node10"),
    ]));
    let d = prepare_node_with_discoverer(&hub, 50, discoverer)?;
    assert_eq!(d.bootstrap().await?, Some(node_ref(10)));
    assert_eq!(d.dht().state()?, NodeState::Joining);
    assert_eq!(successor_ids(&d), vec![90]);

    let mut all = swarms.clone();
    all.push(d.clone());
    stabilize_all(&hub, &all, 4).await?;
    assert_eq!(d.dht().state()?, NodeState::Active);
    assert_eq!(d.dht().predecessor()?, Some(node_ref(40)));
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_without_peers_forms_singleton() -> Result<()> {
    let hub = DummyHub::new();

    let lonely = prepare_node_with_discoverer(&hub, 10, Arc::new(StaticDiscoverer::default()))?;
    assert_eq!(lonely.bootstrap().await?, None);
    assert_eq!(lonely.dht().state()?, NodeState::Active);
    assert!(lonely.dht().owns(RingId::from(99))?);

    // only dead candidates: retries, then gives up
    let discoverer = Arc::new(StaticDiscoverer::new(vec![node_ref(77)]));
    let stubborn = prepare_node_with_discoverer(&hub, 40, discoverer)?;
    assert_eq!(stubborn.bootstrap().await?, None);
    assert_eq!(stubborn.dht().state()?, NodeState::Active);
    assert!(stubborn.dht().successors().is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_isolated_member_rejoins() -> Result<()> {
    let hub = DummyHub::new();
    let mut swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let discoverer = Arc::new(StaticDiscoverer::new(vec![node_ref(10), node_ref(90)]));
    let d = prepare_node_with_discoverer(&hub, 50, discoverer)?;
    swarms.push(d.clone());

    // never bootstrapped: alone with peers around
    assert!(d.dht().is_isolated()?);
    stabilize_all(&hub, &swarms, 5).await?;
    assert_eq!(d.dht().state()?, NodeState::Active);
    assert_eq!(successor_ids(&d)[0], 90);
    assert_eq!(swarms[1].dht().successors().list()?[0], node_ref(50));
    Ok(())
}
