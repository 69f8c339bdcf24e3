#![warn(missing_docs)]
//! This module provider [SwarmBuilder] and it's interface for
//! [Swarm]

use std::sync::Arc;
use std::time::Duration;

use crate::consts::DEFAULT_BOOTSTRAP_ATTEMPTS;
use crate::consts::DEFAULT_BOOTSTRAP_BACKOFF_MS;
use crate::consts::DEFAULT_REPLICATION_FACTOR;
use crate::consts::DEFAULT_RING_BITS;
use crate::consts::DEFAULT_RPC_TIMEOUT_MS;
use crate::dht::NodeRef;
use crate::dht::PeerRing;
use crate::dht::RingId;
use crate::dht::RingSpace;
use crate::dht::Router;
use crate::discovery::Bootstrapper;
use crate::discovery::Discoverer;
use crate::election::Elector;
use crate::error::Error;
use crate::error::Result;
use crate::replication::Replicator;
use crate::storage::Entry;
use crate::storage::EntryStorage;
use crate::storage::MemStorage;
use crate::storage::VersionedStore;
use crate::swarm::Swarm;
use crate::transport::RingClient;
use crate::transport::Transport;

/// Creates a SwarmBuilder to configure a Swarm.
pub struct SwarmBuilder {
    name: String,
    address: String,
    transport: Arc<dyn Transport>,
    local_id: Option<RingId>,
    ring_bits: u8,
    replication_factor: u8,
    rpc_timeout: Duration,
    hop_budget: Option<u32>,
    discoverer: Option<Arc<dyn Discoverer>>,
    storage: Option<EntryStorage>,
    bootstrap_attempts: u32,
    bootstrap_backoff: Duration,
}

impl SwarmBuilder {
    /// Creates new instance of [SwarmBuilder].
    /// `name` is the stable identity source, hashed into the ring id.
    /// `address` is where peers reach this node through `transport`.
    pub fn new(name: &str, address: &str, transport: Arc<dyn Transport>) -> Self {
        SwarmBuilder {
            name: name.to_string(),
            address: address.to_string(),
            transport,
            local_id: None,
            ring_bits: DEFAULT_RING_BITS,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            hop_budget: None,
            discoverer: None,
            storage: None,
            bootstrap_attempts: DEFAULT_BOOTSTRAP_ATTEMPTS,
            bootstrap_backoff: Duration::from_millis(DEFAULT_BOOTSTRAP_BACKOFF_MS),
        }
    }

    /// Pin the ring id instead of hashing the name.
    pub fn local_id(mut self, id: RingId) -> Self {
        self.local_id = Some(id);
        self
    }

    /// Sets up the ring width M.
    pub fn ring_bits(mut self, bits: u8) -> Self {
        self.ring_bits = bits;
        self
    }

    /// Sets up the replication factor R, also the length of the successor list.
    pub fn replication_factor(mut self, factor: u8) -> Self {
        self.replication_factor = factor;
        self
    }

    /// Sets up the timeout of a single rpc.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets up the hop budget of lookups, M + 1 by default.
    pub fn hop_budget(mut self, hops: u32) -> Self {
        self.hop_budget = Some(hops);
        self
    }

    /// Bind a discoverer, used by bootstrap and by isolated members.
    pub fn discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.discoverer = Some(discoverer);
        self
    }

    /// Bind a storage backend, in memory by default.
    pub fn storage(mut self, storage: EntryStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets up discovery rounds of bootstrap.
    pub fn bootstrap_attempts(mut self, attempts: u32) -> Self {
        self.bootstrap_attempts = attempts;
        self
    }

    /// Sets up the first bootstrap backoff, doubled on every retry.
    pub fn bootstrap_backoff(mut self, backoff: Duration) -> Self {
        self.bootstrap_backoff = backoff;
        self
    }

    /// Try build for `Swarm`.
    pub fn build(self) -> Result<Swarm> {
        if self.replication_factor == 0 {
            return Err(Error::InvalidReplicationFactor);
        }
        let space = RingSpace::new(self.ring_bits)?;
        let id = match self.local_id {
            Some(id) => space.id(id.value()),
            None => space.hash(&self.name),
        };
        let local = NodeRef::new(id, self.address);
        tracing::info!("build swarm {} ({}) on a {} bits ring", local, self.name, space.bits());

        let dht = Arc::new(PeerRing::new(local, space, self.replication_factor));
        let client = Arc::new(RingClient::new(
            self.transport,
            dht.clone(),
            self.rpc_timeout,
        ));
        let hop_budget = self
            .hop_budget
            .unwrap_or(self.ring_bits as u32 + 1);
        let router = Arc::new(Router::new(dht.clone(), client.clone(), hop_budget));
        let store = Arc::new(VersionedStore::new(
            space,
            self.storage
                .unwrap_or_else(|| Box::new(MemStorage::<Entry>::new())),
        ));
        let replicator = Arc::new(Replicator::new(
            dht.clone(),
            client.clone(),
            router.clone(),
            store.clone(),
            self.replication_factor as usize,
        ));
        let elector = Arc::new(Elector::new(dht.clone(), client.clone()));
        let bootstrapper = self.discoverer.map(|d| {
            Arc::new(Bootstrapper::new(
                dht.clone(),
                client.clone(),
                router.clone(),
                d,
                self.bootstrap_attempts,
                self.bootstrap_backoff,
            ))
        });

        Ok(Swarm {
            dht,
            client,
            router,
            store,
            replicator,
            elector,
            bootstrapper,
        })
    }
}
