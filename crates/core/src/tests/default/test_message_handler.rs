use crate::dht::RingId;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::message::FindSuccessorSend;
use crate::message::GetPartitionSend;
use crate::message::Message;
use crate::message::MessageReport;
use crate::message::NotifyPredecessorSend;
use crate::message::PutValueSend;
use crate::message::SetPartitionSend;
use crate::storage::Entry;
use crate::tests::default::key_in;
use crate::tests::default::node_ref;
use crate::tests::default::prepare_stable_ring;
use crate::transport::dummy::DummyHub;

#[tokio::test]
async fn test_topology_queries() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let b = &swarms[1];

    let ask = |method: &str| Message::from_method(method, serde_json::Value::Null);
    assert_eq!(b.handle_message(ask("ping")?).await?, MessageReport::Node(node_ref(40)));
    assert_eq!(
        b.handle_message(ask("getPredecessor")?).await?,
        MessageReport::MaybeNode(Some(node_ref(10)))
    );
    assert_eq!(
        b.handle_message(ask("getSuccessorList")?).await?,
        MessageReport::Nodes(vec![node_ref(90), node_ref(10)])
    );
    assert_eq!(
        b.handle_message(ask("queryTopoInfo")?).await?,
        MessageReport::TopoInfo(TopoInfo {
            successors: vec![node_ref(90), node_ref(10)],
            predecessor: Some(node_ref(10)),
        })
    );
    assert_eq!(
        b.handle_message(ask("getCoordinator")?).await?,
        MessageReport::MaybeNode(None)
    );
    Ok(())
}

#[tokio::test]
async fn test_notify_answers_current_predecessor() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let c = &swarms[2];

    // 10 is not closer to 90 than 40
    let msg = Message::Notify(NotifyPredecessorSend {
        candidate: node_ref(10),
    });
    assert_eq!(c.handle_message(msg).await?, MessageReport::Node(node_ref(40)));

    let msg = Message::Notify(NotifyPredecessorSend {
        candidate: node_ref(60),
    });
    assert_eq!(c.handle_message(msg).await?, MessageReport::Node(node_ref(60)));
    Ok(())
}

#[tokio::test]
async fn test_find_successor_hop_budget() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let a = &swarms[0];

    // 45 is two hops away from 10
    let msg = Message::FindSuccessor(FindSuccessorSend {
        id: RingId::from(45),
        hops: 1,
    });
    assert_eq!(a.handle_message(msg).await?, MessageReport::Node(node_ref(90)));

    let msg = Message::FindSuccessor(FindSuccessorSend {
        id: RingId::from(45),
        hops: 0,
    });
    assert!(matches!(
        a.handle_message(msg).await,
        Err(Error::RoutingHopBudgetExceeded(_))
    ));

    // resolved locally, no hop needed
    let msg = Message::FindSuccessor(FindSuccessorSend {
        id: RingId::from(20),
        hops: 0,
    });
    assert_eq!(a.handle_message(msg).await?, MessageReport::Node(node_ref(40)));
    Ok(())
}

#[tokio::test]
async fn test_forwarded_put_is_applied_locally() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, c) = (&swarms[0], &swarms[2]);

    // owned by 90 but marked forwarded: 10 stores it without routing
    let k = key_in(40, 90);
    let msg = Message::Put(PutValueSend {
        key: k.clone(),
        value: b"here".to_vec(),
        forwarded: true,
    });
    assert_eq!(a.handle_message(msg).await?, MessageReport::Ack);
    assert_eq!(a.store().get(&k).await?, Some(b"here".to_vec()));
    assert_eq!(c.store().get(&k).await?, None);

    // not forwarded: routed to the owner
    let msg = Message::Put(PutValueSend {
        key: k.clone(),
        value: b"there".to_vec(),
        forwarded: false,
    });
    a.handle_message(msg).await?;
    assert_eq!(c.store().get(&k).await?, Some(b"there".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_partition_transfer() -> Result<()> {
    let hub = DummyHub::new();
    let swarms = prepare_stable_ring(&hub, &[10, 40, 90], 3).await?;
    let (a, b) = (&swarms[0], &swarms[1]);

    let inside = key_in(10, 40);
    let outside = key_in(40, 90);
    let entries = vec![
        (inside.clone(), Entry::new(Some(b"1".to_vec()), 1)),
        (outside.clone(), Entry::tombstone(2)),
    ];
    let msg = Message::SetPartition(SetPartitionSend { entries });
    assert_eq!(b.handle_message(msg.clone()).await?, MessageReport::Ack);
    assert_eq!(b.store().counts().await?, (1, 1));

    let msg = Message::GetPartition(GetPartitionSend {
        start: RingId::from(10),
        end: RingId::from(40),
    });
    let got = b.handle_message(msg).await?.into_entries()?;
    assert_eq!(got, vec![(inside, Entry::new(Some(b"1".to_vec()), 1))]);

    assert!(a.store().entries().await?.is_empty());
    Ok(())
}
