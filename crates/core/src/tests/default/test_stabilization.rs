use std::time::Duration;

use crate::consts::DEAD_PEER_STRIKES;
use crate::dht::NodeState;
use crate::dht::RingId;
use crate::dht::SuccessorReader;
use crate::error::Error;
use crate::error::Result;
use crate::tests::default::builder;
use crate::tests::default::expected_owner;
use crate::tests::default::node_ref;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;
use crate::tests::default::prepare_stable_ring;
use crate::tests::default::register;
use crate::tests::default::space;
use crate::tests::default::stabilize_all;
use crate::tests::default::successor_ids;
use crate::tests::default::BITS;
use crate::transport::dummy::DummyHub;

#[tokio::test]
async fn test_join_through_singleton() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_ring(&hub, &[10, 40], 3).await?;
    let (a, b) = (&swarms[0], &swarms[1]);

    assert_eq!(a.dht().state()?, NodeState::Active);
    assert_eq!(b.dht().state()?, NodeState::Joining);
    assert_eq!(successor_ids(b), vec![10]);
    assert_eq!(b.dht().predecessor()?, None);

    stabilize_all(&hub, &swarms, 3).await?;
    assert_eq!(b.dht().state()?, NodeState::Active);
    assert_eq!(successor_ids(a), vec![40]);
    assert_eq!(successor_ids(b), vec![10]);
    assert_eq!(a.dht().predecessor()?, Some(node_ref(40)));
    assert_eq!(b.dht().predecessor()?, Some(node_ref(10)));
    Ok(())
}

#[tokio::test]
async fn test_ring_closure() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, b, c) = (&swarms[0], &swarms[1], &swarms[2]);

    assert_eq!(successor_ids(a), vec![40, 90]);
    assert_eq!(successor_ids(b), vec![90, 10]);
    assert_eq!(successor_ids(c), vec![10, 40]);
    assert_eq!(a.dht().predecessor()?, Some(node_ref(90)));
    assert_eq!(b.dht().predecessor()?, Some(node_ref(10)));
    assert_eq!(c.dht().predecessor()?, Some(node_ref(40)));

    // Walking successors from any member comes back to it.
    for start in swarms.iter() {
        let mut at = start.local();
        for _ in 0..swarms.len() {
            let s = swarms.iter().find(|s| s.local() == at).unwrap();
            at = s.dht().successors().min()?;
        }
        assert_eq!(at, start.local());
    }

    for s in swarms.iter() {
        assert_eq!(s.dht().state()?, NodeState::Active);
    }
    Ok(())
}

#[tokio::test]
async fn test_fingers_converge() -> Result<()> {
    let hub = DummyHub::new();
    let ids = [10, 40, 90];
    let swarms = prepare_stable_ring(&hub, &ids, 3).await?;
    let space = crate::tests::default::space();

    for s in swarms.iter() {
        let finger = s.dht().lock_finger()?.list().clone();
        for (i, entry) in finger.iter().enumerate() {
            let start = space.finger_start(s.local().id, i as u8);
            let owner = expected_owner(&ids, start.value());
            if owner == s.local().id.value() {
                assert_eq!(entry, &None, "{} finger {}", s.local(), i);
            } else {
                assert_eq!(entry, &Some(node_ref(owner)), "{} finger {}", s.local(), i);
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_responsibility_is_unique() -> Result<()> {
    let hub = DummyHub::new();
    let ids = [10, 40, 90];
    let swarms = prepare_stable_ring(&hub, &ids, 3).await?;

    for x in (0..128).step_by(5) {
        let expected = node_ref(expected_owner(&ids, x));
        for s in swarms.iter() {
            assert_eq!(s.find_successor(RingId::from(x)).await?, expected);
        }
        let owners = swarms
            .iter()
            .filter(|s| s.dht().owns(RingId::from(x)).unwrap())
            .count();
        assert_eq!(owners, 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_new_node_takes_over_range() -> Result<()> {
    let hub = DummyHub::new();
    let mut swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let d = crate::tests::default::prepare_node(&hub, 50, 3)?;
    d.join(node_ref(10)).await?;
    swarms.push(d.clone());

    // 90 answers for 45 until 50 stabilizes.
    for s in swarms.iter() {
        assert_eq!(s.find_successor(RingId::from(45)).await?, node_ref(90));
    }

    stabilize_all(&hub, &swarms, 4).await?;
    assert_eq!(d.dht().state()?, NodeState::Active);
    assert_eq!(d.dht().predecessor()?, Some(node_ref(40)));
    assert_eq!(successor_ids(&swarms[1]), vec![50, 90, 10]);
    for s in swarms.iter() {
        assert_eq!(s.find_successor(RingId::from(45)).await?, node_ref(50));
        assert_eq!(s.find_successor(RingId::from(51)).await?, node_ref(90));
    }
    Ok(())
}

#[tokio::test]
async fn test_dead_successor_is_evicted() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, c) = (&swarms[0], &swarms[2]);

    hub.kill("node40");
    stabilize_all(&hub, &swarms, 6).await?;

    assert_eq!(successor_ids(a), vec![90]);
    assert_eq!(successor_ids(c), vec![10]);
    assert_eq!(c.dht().predecessor()?, Some(node_ref(10)));
    assert!(!a.dht().lock_finger()?.contains(RingId::from(40)));
    assert_eq!(a.find_successor(RingId::from(30)).await?, node_ref(90));
    Ok(())
}

#[tokio::test]
async fn test_last_survivor_forms_singleton() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let b = &swarms[1];

    hub.kill("node10");
    hub.kill("node90");
    stabilize_all(&hub, &swarms, 6).await?;

    assert!(b.dht().is_isolated()?);
    assert!(b.dht().owns(RingId::from(100))?);
    assert_eq!(b.find_successor(RingId::from(100)).await?, node_ref(40));
    Ok(())
}

#[tokio::test]
async fn test_twelve_members_converge() -> Result<()> {
    let hub = DummyHub::new();
    let ids = [3, 17, 29, 41, 52, 64, 77, 85, 96, 103, 115, 126];
    let mut swarms = vec![];
    for (i, id) in ids.iter().enumerate() {
        let s = prepare_node(&hub, *id, 3)?;
        if i == 0 {
            s.create()?;
        } else {
            s.join(node_ref(ids[i / 2])).await?;
        }
        swarms.push(s);
        stabilize_all(&hub, &swarms, 1).await?;
    }
    stabilize_all(&hub, &swarms, 40).await?;
    let space = space();

    let n = ids.len();
    for (i, s) in swarms.iter().enumerate() {
        assert_eq!(s.dht().state()?, NodeState::Active, "{}", s.local());
        assert_eq!(
            s.dht().predecessor()?,
            Some(node_ref(ids[(i + n - 1) % n])),
            "{}",
            s.local()
        );
        let expected = (1..=3).map(|k| ids[(i + k) % n]).collect::<Vec<_>>();
        assert_eq!(successor_ids(s), expected, "{}", s.local());

        let finger = s.dht().lock_finger()?.list().clone();
        for (j, entry) in finger.iter().enumerate() {
            let start = space.finger_start(s.local().id, j as u8);
            let owner = expected_owner(&ids, start.value());
            if owner == s.local().id.value() {
                assert_eq!(entry, &None, "{} finger {}", s.local(), j);
            } else {
                assert_eq!(entry, &Some(node_ref(owner)), "{} finger {}", s.local(), j);
            }
        }
    }

    for x in (0..128).step_by(3) {
        let expected = node_ref(expected_owner(&ids, x));
        for s in swarms.iter() {
            assert_eq!(s.find_successor(RingId::from(x)).await?, expected);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_hung_peer_does_not_get_healthy_hop_evicted() -> Result<()> {
    let hub = DummyHub::new();
    let ids = [10, 80, 90, 100];
    let mut swarms = vec![];
    for id in ids {
        let swarm = builder(&hub, id)
            .rpc_timeout(Duration::from_millis(100))
            .build()?;
        swarms.push(register(&hub, swarm));
    }
    swarms[0].create()?;
    for s in swarms.iter().skip(1) {
        s.join(node_ref(10)).await?;
    }
    stabilize_all(&hub, &swarms, BITS as usize + 3).await?;
    let (a, b) = (&swarms[0], &swarms[1]);

    // 10 reaches 95 through 80, which forwards to 90
    hub.hang("node90");
    for tick in 1..=DEAD_PEER_STRIKES {
        a.dht().begin_tick();
        b.dht().begin_tick();
        let found = a.find_successor(RingId::from(95)).await;
        if tick < DEAD_PEER_STRIKES {
            assert!(matches!(
                found,
                Err(Error::PeerUnreachable(id)) if id == RingId::from(90)
            ));
        } else {
            // 80 evicted 90, its next successor answers
            assert_eq!(found?, node_ref(100));
        }
    }
    assert_eq!(a.dht().strikes(RingId::from(80)), 0);
    assert!(!a.dht().is_dead(RingId::from(80)));
    assert!(b.dht().is_dead(RingId::from(90)));
    Ok(())
}
