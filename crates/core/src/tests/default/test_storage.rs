use crate::consts::RESOLVE_EVERY;
use crate::dht::RingId;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::MessageReport;
use crate::message::PushReplicaSend;
use crate::storage::Entry;
use crate::tests::default::address;
use crate::tests::default::builder;
use crate::tests::default::key_in;
use crate::tests::default::node_ref;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_stable_ring;
use crate::tests::default::replicate_all;
use crate::tests::default::register;
use crate::tests::default::space;
use crate::tests::default::stabilize_all;
use crate::tests::default::successor_ids;
use crate::transport::dummy::DummyHub;

#[tokio::test]
async fn test_put_then_get_from_another_member() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, b, c) = (&swarms[0], &swarms[1], &swarms[2]);

    // owned by 90, written through 10, read through 40
    let k1 = key_in(40, 90);
    a.put(&k1, b"v1".to_vec()).await?;
    assert_eq!(c.store().get(&k1).await?, Some(b"v1".to_vec()));
    assert_eq!(a.store().get(&k1).await?, None);
    assert_eq!(b.get(&k1).await?, Some(b"v1".to_vec()));

    assert_eq!(b.get("never written").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_writes_replicate_to_successors() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;

    let k1 = key_in(10, 40);
    swarms[2].put(&k1, b"v1".to_vec()).await?;
    // acknowledged before replication
    assert_eq!(swarms[2].store().get(&k1).await?, None);
    replicate_all(&hub, &swarms, 1).await?;
    for s in swarms.iter() {
        assert_eq!(s.store().get(&k1).await?, Some(b"v1".to_vec()));
    }

    assert!(swarms[0].delete(&k1).await?);
    assert!(!swarms[0].delete(&k1).await?);
    replicate_all(&hub, &swarms, 1).await?;
    for s in swarms.iter() {
        assert_eq!(s.store().get(&k1).await?, None);
        assert!(s.store().entry(&k1).await?.unwrap().is_tombstone());
    }
    assert_eq!(swarms[2].get(&k1).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_survives_r_minus_one_failures() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let b = &swarms[1];

    let k = key_in(40, 90);
    swarms[0].put(&k, b"precious".to_vec()).await?;
    replicate_all(&hub, &swarms, 1).await?;

    // the responsible member and its first successor
    hub.kill("node90");
    hub.kill("node10");

    // served from the local replica while the owner is unreachable
    assert_eq!(b.get(&k).await?, Some(b"precious".to_vec()));

    stabilize_all(&hub, &swarms, 6).await?;
    replicate_all(&hub, &swarms, 1).await?;
    assert!(b.dht().owns(space().hash(&k))?);
    assert_eq!(b.get(&k).await?, Some(b"precious".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_push_replica_is_idempotent() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let b = &swarms[1];

    let msg = Message::PushReplica(PushReplicaSend {
        key: "k1".to_string(),
        entry: Entry::new(Some(b"v1".to_vec()), 42),
    });
    assert_eq!(b.handle_message(msg.clone()).await?, MessageReport::Ack);
    let once = b.store().entries().await?;
    assert_eq!(b.handle_message(msg).await?, MessageReport::Ack);
    assert_eq!(b.store().entries().await?, once);

    // an older version does not overwrite
    let stale = Message::PushReplica(PushReplicaSend {
        key: "k1".to_string(),
        entry: Entry::new(Some(b"v0".to_vec()), 41),
    });
    b.handle_message(stale).await?;
    assert_eq!(b.store().get("k1").await?, Some(b"v1".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_new_member_pulls_its_range() -> Result<()> {
    let hub = DummyHub::new();
    let mut swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let k = key_in(40, 50);
    swarms[0].put(&k, b"moved".to_vec()).await?;
    replicate_all(&hub, &swarms, 1).await?;

    let d = prepare_node(&hub, 50, 3)?;
    d.join(node_ref(10)).await?;
    swarms.push(d.clone());
    assert!(!d.replicator().caught_up());

    stabilize_all(&hub, &swarms, 4).await?;
    replicate_all(&hub, &swarms, 1).await?;

    assert!(d.replicator().caught_up());
    assert!(d.dht().owns(space().hash(&k))?);
    assert_eq!(d.store().get(&k).await?, Some(b"moved".to_vec()));
    for s in swarms.iter() {
        assert_eq!(s.get(&k).await?, Some(b"moved".to_vec()));
    }
    Ok(())
}

#[tokio::test]
async fn test_stray_entries_are_handed_off() -> Result<()> {
    let hub = DummyHub::new();
    // R = 2: 10 holds replicas of 90 only
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 2).await?;
    let (a, b) = (&swarms[0], &swarms[1]);

    let k = key_in(10, 40);
    a.store()
        .apply(&k, Entry::new(Some(b"stray".to_vec()), 7))
        .await?;
    assert_eq!(a.replicator().resolve_replicas().await?, 1);
    assert_eq!(a.store().entry(&k).await?, None);
    assert_eq!(b.store().get(&k).await?, Some(b"stray".to_vec()));

    // replicas of the predecessor stay
    let k2 = key_in(40, 90);
    a.store()
        .apply(&k2, Entry::new(Some(b"replica".to_vec()), 7))
        .await?;
    assert_eq!(a.replicator().resolve_replicas().await?, 0);
    assert!(a.store().entry(&k2).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_leave_hands_off_keys() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, b, c) = (&swarms[0], &swarms[1], &swarms[2]);

    let k = key_in(40, 90);
    c.put(&k, b"v".to_vec()).await?;
    c.leave().await?;
    assert_eq!(a.store().get(&k).await?, Some(b"v".to_vec()));

    assert!(matches!(c.put("x", b"x".to_vec()).await, Err(Error::NodeLeaving)));
    assert!(matches!(
        c.handle_message(Message::Ping(Default::default())).await,
        Err(Error::PeerUnreachable(id)) if id == RingId::from(90)
    ));

    stabilize_all(&hub, &swarms, 6).await?;
    assert!(a.dht().owns(space().hash(&k))?);
    assert_eq!(b.get(&k).await?, Some(b"v".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_get_reports_hop_budget_overrun() -> Result<()> {
    let hub = DummyHub::new();
    let mut swarms = prepare_stable_ring(&hub, &[40, 90], 3).await?;
    let a = register(&hub, builder(&hub, 10).hop_budget(0).build()?);
    a.join(node_ref(40)).await?;
    swarms.push(a.clone());
    stabilize_all(&hub, &swarms, 4).await?;

    let k = key_in(40, 90);
    swarms[1].put(&k, b"v".to_vec()).await?;
    // 10 has to forward and may not
    assert!(matches!(
        a.get(&k).await,
        Err(Error::RoutingHopBudgetExceeded(0))
    ));
    Ok(())
}

#[tokio::test]
async fn test_get_without_replica_reports_unreachable_owner() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90, 120], 2).await?;
    let (a, d) = (&swarms[0], &swarms[3]);

    let k1 = key_in(40, 90);
    a.put(&k1, b"v1".to_vec()).await?;
    replicate_all(&hub, &swarms, 1).await?;
    assert_eq!(a.store().entry(&k1).await?, None);
    assert_eq!(d.store().get(&k1).await?, Some(b"v1".to_vec()));

    hub.kill("node90");
    assert!(matches!(
        a.get(&k1).await,
        Err(Error::PeerUnreachable(id)) if id == RingId::from(90)
    ));
    // 120 holds the replica
    assert_eq!(d.get(&k1).await?, Some(b"v1".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_replicated_tombstone_answers_for_unreachable_owner() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90, 120], 2).await?;
    let (a, d) = (&swarms[0], &swarms[3]);

    let k = key_in(40, 90);
    a.put(&k, b"v".to_vec()).await?;
    assert!(a.delete(&k).await?);
    replicate_all(&hub, &swarms, 1).await?;

    hub.kill("node90");
    assert_eq!(d.get(&k).await?, None);
    assert!(a.get(&k).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_missed_push_is_repaired() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, b, c) = (&swarms[0], &swarms[1], &swarms[2]);

    let k = key_in(40, 90);
    hub.kill("node40");
    c.put(&k, b"v".to_vec()).await?;
    c.replicator().replicate().await?;
    assert_eq!(a.store().get(&k).await?, Some(b"v".to_vec()));
    assert_eq!(b.store().get(&k).await?, None);

    hub.revive("node40");
    stabilize_all(&hub, &swarms, 1).await?;
    replicate_all(&hub, &swarms, 1).await?;
    assert_eq!(b.store().get(&k).await?, Some(b"v".to_vec()));

    hub.kill("node90");
    hub.kill("node10");
    assert_eq!(b.get(&k).await?, Some(b"v".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_periodic_push_restores_lost_replica() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (b, c) = (&swarms[1], &swarms[2]);

    let k = key_in(40, 90);
    c.put(&k, b"v".to_vec()).await?;
    replicate_all(&hub, &swarms, 1).await?;
    // a replica that lost its copy without the owner noticing
    b.store().purge(&k).await?;
    assert_eq!(b.store().entry(&k).await?, None);

    replicate_all(&hub, &swarms, RESOLVE_EVERY as usize).await?;
    assert_eq!(b.store().get(&k).await?, Some(b"v".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_failed_pushes_strike_once_per_tick() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, c) = (&swarms[0], &swarms[2]);
    let forty = RingId::from(40);

    hub.kill("node40");
    let k = key_in(40, 90);
    for v in [b"v1", b"v2", b"v3"] {
        c.put(&k, v.to_vec()).await?;
    }
    c.replicator().replicate().await?;
    assert_eq!(c.dht().strikes(forty), 1);
    assert!(!c.dht().is_dead(forty));
    assert_eq!(successor_ids(c), vec![10, 40]);

    stabilize_all(&hub, &swarms, 2).await?;
    assert_eq!(a.dht().strikes(forty), 2);
    assert!(!a.dht().is_dead(forty));
    assert!(successor_ids(a).contains(&40));

    stabilize_all(&hub, &swarms, 1).await?;
    assert!(a.dht().is_dead(forty));
    assert_eq!(successor_ids(a), vec![90]);
    Ok(())
}

#[tokio::test]
async fn test_failed_pull_is_retried() -> Result<()> {
    let hub = DummyHub::new();
    let mut swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let k = key_in(40, 50);
    swarms[0].put(&k, b"moved".to_vec()).await?;
    replicate_all(&hub, &swarms, 1).await?;

    let d = prepare_node(&hub, 50, 3)?;
    d.join(node_ref(10)).await?;
    swarms.push(d.clone());
    stabilize_all(&hub, &swarms, 4).await?;
    assert_eq!(d.dht().predecessor()?, Some(node_ref(40)));

    for id in [10, 40, 90] {
        hub.kill(&address(id));
    }
    d.replicator().replicate().await?;
    assert!(!d.replicator().caught_up());
    assert_eq!(d.store().get(&k).await?, None);

    for id in [10, 40, 90] {
        hub.revive(&address(id));
    }
    d.replicator().replicate().await?;
    assert!(d.replicator().caught_up());
    assert_eq!(d.store().get(&k).await?, Some(b"moved".to_vec()));
    Ok(())
}
