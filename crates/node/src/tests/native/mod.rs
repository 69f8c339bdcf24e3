use std::net::TcpListener;
use std::sync::Arc;

use chordkv_core::dht::NodeRef;
use chordkv_core::dht::NodeState;
use chordkv_core::dht::RingId;
use chordkv_core::message::Message;
use chordkv_core::message::MessageReport;
use chordkv_core::message::PingSend;
use chordkv_core::transport::Transport;

use crate::client::Client;
use crate::error::Error;
use crate::error::Result;
use crate::native::config::Config;
use crate::native::config::StorageConfig;
use crate::native::endpoint::serve;
use crate::native::transport::HttpTransport;
use crate::processor::Processor;
use crate::util::endpoint_url;

/// Start a node serving on an ephemeral local port.
pub async fn prepare_processor(name: &str, seeds: Vec<String>) -> Result<(Arc<Processor>, Client)> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| Error::InvalidAddress(e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| Error::InvalidAddress(e.to_string()))?
        .to_string();

    let mut config = Config::new(name);
    config.advertise_addr = Some(addr.clone());
    config.rendezvous = None;
    config.seeds = seeds;
    config.replication_factor = 2;
    config.rpc_timeout_ms = 1000;
    config.bootstrap_backoff_ms = 10;
    config.storage = StorageConfig::Memory;

    let processor = Arc::new(Processor::from_config(&config)?);
    tokio::spawn(serve(listener, processor.clone()));
    Ok((processor, Client::new(&endpoint_url(&addr))))
}

async fn stabilize(nodes: &[&Arc<Processor>], rounds: usize) -> Result<()> {
    for _ in 0..rounds {
        for n in nodes {
            n.swarm.stabilizer().stabilize().await?;
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_two_nodes_over_http() -> Result<()> {
    let (a, client_a) = prepare_processor("node-a", vec![]).await?;
    assert_eq!(a.bootstrap().await?, None);

    let (b, client_b) = prepare_processor("node-b", vec![a.local().address]).await?;
    assert_eq!(b.bootstrap().await?, Some(a.local()));

    stabilize(&[&a, &b], 3).await?;
    let info_a = client_a.inspect().await?;
    let info_b = client_b.inspect().await?;
    assert_eq!(info_a.dht.state, NodeState::Active);
    assert_eq!(info_b.dht.state, NodeState::Active);
    assert_eq!(info_a.dht.successors, vec![b.local().to_string()]);
    assert_eq!(info_b.dht.predecessor, Some(a.local().to_string()));

    for i in 0..8 {
        let key = format!("key{}", i);
        client_b.put(&key, key.as_bytes().to_vec()).await?;
        assert_eq!(client_a.get(&key).await?, Some(key.as_bytes().to_vec()));
    }
    assert!(client_a.delete("key0").await?);
    assert_eq!(client_b.get("key0").await?, None);
    assert!(!client_b.delete("key0").await?);
    Ok(())
}

#[tokio::test]
async fn test_status_page() -> Result<()> {
    let (a, client) = prepare_processor("node-status", vec![]).await?;
    a.bootstrap().await?;

    let url = format!("{}/status", endpoint_url(&a.local().address));
    let resp = reqwest::get(url)
        .await
        .map_err(|e| Error::HttpRequestError(e.to_string()))?;
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("X-NODE-VERSION"));
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| Error::HttpRequestError(e.to_string()))?;
    assert_eq!(body["dht"]["local"], a.local().to_string());

    assert!(matches!(
        client.call_method::<serde_json::Value>("noSuchMethod", serde_json::Value::Null).await,
        Err(Error::InvalidMethod)
    ));
    Ok(())
}

#[tokio::test]
async fn test_leaving_node_reports_itself_unreachable() -> Result<()> {
    let (a, client) = prepare_processor("node-leaving", vec![]).await?;
    a.bootstrap().await?;

    let ping = Message::Ping(PingSend {});
    assert_eq!(client.call(&ping).await?, MessageReport::Node(a.local()));

    a.leave().await?;
    assert!(matches!(
        client.call(&ping).await,
        Err(Error::PeerUnreachable(id)) if id == a.local().id
    ));
    assert!(matches!(client.put("k", b"v".to_vec()).await, Err(Error::PeerUnreachable(_))));
    Ok(())
}

#[tokio::test]
async fn test_transport_to_closed_port() {
    // bind then drop to get a port nobody listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .to_string();
    let target = NodeRef::new(RingId::from(11), addr);
    let transport = HttpTransport::new(std::time::Duration::from_millis(500)).unwrap();
    let ret = transport.call(&target, Message::Ping(PingSend {})).await;
    assert!(matches!(
        ret,
        Err(chordkv_core::error::Error::PeerUnreachable(id)) if id == RingId::from(11)
    ));
}
