#![warn(missing_docs)]

//! Processor of chordkv-node rpc server.

use std::sync::Arc;
use std::time::Duration;

use chordkv_core::consts::DEFAULT_ELECT_INTERVAL_MS;
use chordkv_core::consts::DEFAULT_REPLICATE_INTERVAL_MS;
use chordkv_core::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use chordkv_core::dht::NodeRef;
use chordkv_core::inspect::SwarmInspect;
use chordkv_core::message::Message;
use chordkv_core::message::MessageReport;
use chordkv_core::storage::Entry;
use chordkv_core::storage::EntryStorage;
use chordkv_core::storage::MemStorage;
use chordkv_core::storage::SledStorage;
use chordkv_core::swarm::Swarm;
use chordkv_core::swarm::SwarmBuilder;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::native::config::Config;
use crate::native::config::StorageConfig;
use crate::native::discovery::DnsDiscoverer;
use crate::native::transport::HttpTransport;
use crate::util::expand_home;

/// Intervals of the background loops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Stabilization interval.
    pub stabilize_interval: Duration,
    /// Replication pass interval.
    pub replicate_interval: Duration,
    /// Coordinator check interval.
    pub elect_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_INTERVAL_MS),
            replicate_interval: Duration::from_millis(DEFAULT_REPLICATE_INTERVAL_MS),
            elect_interval: Duration::from_millis(DEFAULT_ELECT_INTERVAL_MS),
        }
    }
}

/// Processor for chordkv-node rpc server
pub struct Processor {
    /// a swarm instance
    pub swarm: Arc<Swarm>,
    config: ProcessorConfig,
}

impl Processor {
    /// Wrap a built swarm.
    pub fn new(swarm: Arc<Swarm>, config: ProcessorConfig) -> Self {
        Self { swarm, config }
    }

    /// Build the swarm described by `config`: HTTP transport, DNS discovery, configured storage.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(config.rpc_timeout())?);
        let discoverer = Arc::new(DnsDiscoverer::new(
            config.rendezvous.clone(),
            config.port,
            config.seeds.clone(),
        ));

        let mut builder = SwarmBuilder::new(&config.hostname, &config.advertise_addr(), transport)
            .ring_bits(config.ring_bits)
            .replication_factor(config.replication_factor)
            .rpc_timeout(config.rpc_timeout())
            .discoverer(discoverer)
            .storage(open_storage(&config.storage)?)
            .bootstrap_attempts(config.bootstrap_attempts)
            .bootstrap_backoff(config.bootstrap_backoff());
        if let Some(hops) = config.hop_budget {
            builder = builder.hop_budget(hops);
        }

        Ok(Self::new(Arc::new(builder.build()?), config.into()))
    }

    /// Identity of the local node.
    pub fn local(&self) -> NodeRef {
        self.swarm.local()
    }

    /// Join through discovery, or form a singleton ring.
    pub async fn bootstrap(&self) -> Result<Option<NodeRef>> {
        let peer = self.swarm.bootstrap().await?;
        match &peer {
            Some(p) => tracing::info!("{} joined through {}", self.local(), p),
            None => tracing::info!("{} formed a new ring", self.local()),
        }
        Ok(peer)
    }

    /// Spawn stabilization, replication and election loops on the tokio runtime.
    pub fn spawn_daemons(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(
                self.swarm
                    .stabilizer()
                    .wait(self.config.stabilize_interval),
            ),
            tokio::spawn(
                self.swarm
                    .replicator()
                    .wait(self.config.replicate_interval),
            ),
            tokio::spawn(self.swarm.elector().wait(self.config.elect_interval)),
        ]
    }

    /// Answer a message from a peer or a client.
    pub async fn handle_message(&self, msg: Message) -> Result<MessageReport> {
        Ok(self.swarm.handle_message(msg).await?)
    }

    /// Snapshot of the local node.
    pub async fn inspect(&self) -> Result<SwarmInspect> {
        Ok(self.swarm.inspect().await?)
    }

    /// Hand data off and stop serving.
    pub async fn leave(&self) -> Result<()> {
        Ok(self.swarm.leave().await?)
    }
}

fn open_storage(config: &StorageConfig) -> Result<EntryStorage> {
    match config {
        StorageConfig::Memory => Ok(Box::new(MemStorage::<Entry>::new())),
        StorageConfig::Sled { path, capacity } => {
            let path = expand_home(path)?;
            tracing::info!("open storage at {:?}", path);
            Ok(Box::new(SledStorage::new_with_cap_and_path(*capacity, path)?))
        }
    }
}
