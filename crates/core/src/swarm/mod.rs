#![warn(missing_docs)]
//! A ring member: routing state, local store and the daemons driving them, behind one handle.

mod builder;

use std::sync::Arc;

pub use builder::SwarmBuilder;

use crate::dht::NodeRef;
use crate::dht::NodeState;
use crate::dht::PeerRing;
use crate::dht::RingId;
use crate::dht::Router;
use crate::dht::Stabilizer;
use crate::dht::SuccessorReader;
use crate::discovery::Bootstrapper;
use crate::election::Elector;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::SwarmInspect;
use crate::replication::Replicator;
use crate::storage::VersionedStore;
use crate::transport::RingClient;

/// The dht, store and rpc client of a ring member.
pub struct Swarm {
    /// Reference of DHT.
    pub(crate) dht: Arc<PeerRing>,
    pub(crate) client: Arc<RingClient>,
    pub(crate) router: Arc<Router>,
    pub(crate) store: Arc<VersionedStore>,
    pub(crate) replicator: Arc<Replicator>,
    pub(crate) elector: Arc<Elector>,
    pub(crate) bootstrapper: Option<Arc<Bootstrapper>>,
}

impl Swarm {
    /// Identity of self.
    pub fn local(&self) -> NodeRef {
        self.dht.local.clone()
    }

    /// Get DHT(Distributed Hash Table) of self.
    pub fn dht(&self) -> Arc<PeerRing> {
        self.dht.clone()
    }

    /// Local versioned store.
    pub fn store(&self) -> Arc<VersionedStore> {
        self.store.clone()
    }

    /// Stabilization driver of this member.
    pub fn stabilizer(&self) -> Arc<Stabilizer> {
        Arc::new(Stabilizer::new(
            self.dht.clone(),
            self.client.clone(),
            self.router.clone(),
            self.bootstrapper.clone(),
        ))
    }

    /// Replication driver of this member.
    pub fn replicator(&self) -> Arc<Replicator> {
        self.replicator.clone()
    }

    /// Election driver of this member.
    pub fn elector(&self) -> Arc<Elector> {
        self.elector.clone()
    }

    fn ensure_serving(&self) -> Result<()> {
        if self.dht.state()? == NodeState::Leaving {
            return Err(Error::NodeLeaving);
        }
        Ok(())
    }

    /// Form a singleton ring.
    pub fn create(&self) -> Result<()> {
        self.dht.create()
    }

    /// Join the ring containing `bootstrap`.
    pub async fn join(&self, bootstrap: NodeRef) -> Result<()> {
        self.router.join(bootstrap).await
    }

    /// Join through discovery, or form a singleton ring if nobody is found.
    /// Without a discoverer the node forms a singleton ring.
    pub async fn bootstrap(&self) -> Result<Option<NodeRef>> {
        match &self.bootstrapper {
            Some(b) => b.bootstrap().await,
            None => {
                self.create()?;
                Ok(None)
            }
        }
    }

    /// Hand every owned entry to the successor and stop serving.
    /// Best effort: the node leaves even if the transfer fails.
    pub async fn leave(&self) -> Result<()> {
        self.ensure_serving()?;
        let succ = self.dht.successors().list()?.into_iter().next();
        if let Some(succ) = succ {
            let mut owned = vec![];
            for (key, entry) in self.store.entries().await? {
                if self.dht.owns(self.store.key_id(&key))? {
                    owned.push((key, entry));
                }
            }
            let n = owned.len();
            match self.client.set_partition(&succ, owned).await {
                Ok(()) => tracing::info!("[membership] {} handed {} entries to {}", self.dht.id(), n, succ),
                Err(e) => tracing::warn!("[membership] hand off to {} failed: {:?}", succ, e),
            }
        }
        self.dht.set_state(NodeState::Leaving)
    }

    /// Resolve the member responsible for `id`.
    pub async fn find_successor(&self, id: RingId) -> Result<NodeRef> {
        self.router.find_successor(id).await
    }

    /// `Some(owner)` when the key must be served remotely, `None` when it is ours.
    async fn remote_owner(&self, key: &str) -> Result<Option<NodeRef>> {
        let id = self.store.key_id(key);
        if self.dht.owns(id)? {
            return Ok(None);
        }
        let owner = self.router.find_successor(id).await?;
        if owner.id == self.dht.id() {
            return Ok(None);
        }
        Ok(Some(owner))
    }

    /// Store a value on its responsible member. Acknowledged once the responsible member
    /// wrote it, replication follows asynchronously.
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_serving()?;
        match self.remote_owner(key).await? {
            None => self.put_local(key, value).await,
            Some(owner) => self.client.put(&owner, key, value, true).await,
        }
    }

    /// Read a value from its responsible member.
    /// When that member cannot be reached, a local replica answers if this node holds an
    /// entry for the key (a tombstone included). Without one the failure is returned, an
    /// unreachable owner is never reported as a missing key.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_serving()?;
        let ret = match self.remote_owner(key).await {
            Ok(None) => return self.store.get(key).await,
            Ok(Some(owner)) => self.client.get(&owner, key, true).await,
            Err(e) => Err(e),
        };
        match ret {
            Err(Error::PeerUnreachable(id)) => match self.store.entry(key).await? {
                Some(replica) => {
                    tracing::warn!("get {} served by local replica, {} unreachable", key, id);
                    Ok(replica.value)
                }
                None => Err(Error::PeerUnreachable(id)),
            },
            r => r,
        }
    }

    /// Delete a key on its responsible member, returns whether a live value was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_serving()?;
        match self.remote_owner(key).await? {
            None => self.delete_local(key).await,
            Some(owner) => self.client.delete(&owner, key, true).await,
        }
    }

    pub(crate) async fn put_local(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let entry = self.store.put(key, value).await?;
        self.replicator.enqueue(key, entry)
    }

    pub(crate) async fn delete_local(&self, key: &str) -> Result<bool> {
        let (removed, tombstone) = self.store.delete(key).await?;
        self.replicator.enqueue(key, tombstone)?;
        Ok(removed)
    }

    /// Snapshot of the member for debugging and monitoring.
    pub async fn inspect(&self) -> Result<SwarmInspect> {
        SwarmInspect::inspect(self).await
    }
}
