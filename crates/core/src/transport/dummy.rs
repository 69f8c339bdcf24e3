//! In process transport. Swarms registered on one [DummyHub] call each other's
//! message handler directly, which makes multi-node scenarios deterministic.
//! A node marked down on the hub answers nothing, like a crashed process. A hung node
//! accepts calls but never answers them.
use std::sync::Arc;
use std::sync::Weak;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::dht::NodeRef;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::MessageReport;
use crate::swarm::Swarm;
use crate::transport::Transport;

/// Address book of in process swarms.
#[derive(Default)]
pub struct DummyHub {
    peers: DashMap<String, Weak<Swarm>>,
    down: DashMap<String, ()>,
    hung: DashMap<String, ()>,
}

impl DummyHub {
    /// Create an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `swarm` reachable at its address.
    pub fn register(&self, swarm: &Arc<Swarm>) {
        self.peers
            .insert(swarm.local().address, Arc::downgrade(swarm));
    }

    /// Simulate a crash of the node at `address`.
    pub fn kill(&self, address: &str) {
        tracing::info!("dummy transport: {} is down", address);
        self.down.insert(address.to_string(), ());
    }

    /// Make calls to the node at `address` hang until the caller gives up.
    pub fn hang(&self, address: &str) {
        tracing::info!("dummy transport: {} hangs", address);
        self.hung.insert(address.to_string(), ());
    }

    /// Bring the node at `address` back.
    pub fn revive(&self, address: &str) {
        self.down.remove(address);
        self.hung.remove(address);
    }

    /// Whether the node at `address` is marked down.
    pub fn is_down(&self, address: &str) -> bool {
        self.down.contains_key(address)
    }

    /// Whether calls to the node at `address` hang.
    pub fn is_hung(&self, address: &str) -> bool {
        self.hung.contains_key(address)
    }

    fn lookup(&self, address: &str) -> Option<Arc<Swarm>> {
        self.peers.get(address).and_then(|w| w.value().upgrade())
    }
}

/// [Transport] delivering messages through a [DummyHub].
#[derive(Clone)]
pub struct DummyTransport {
    hub: Arc<DummyHub>,
}

impl DummyTransport {
    /// Create a transport on `hub`.
    pub fn new(hub: Arc<DummyHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Transport for DummyTransport {
    async fn call(&self, target: &NodeRef, msg: Message) -> Result<MessageReport> {
        if self.hub.is_down(&target.address) {
            return Err(Error::PeerUnreachable(target.id));
        }
        if self.hub.is_hung(&target.address) {
            return futures::future::pending().await;
        }
        let swarm = self
            .hub
            .lookup(&target.address)
            .ok_or(Error::PeerUnreachable(target.id))?;
        swarm.handle_message(msg).await
    }
}
