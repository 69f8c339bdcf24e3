//! Finding a way into the ring.
//!
//! A [Discoverer] resolves a rendezvous name to candidate peers. The identity carried by a
//! candidate is only a hint: [Bootstrapper] pings each one and trusts the identity in the
//! answer. The first live candidate that is not ourselves becomes the bootstrap peer.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_timer::Delay;

use crate::dht::NodeRef;
use crate::dht::PeerRing;
use crate::dht::Router;
use crate::error::Error;
use crate::error::Result;
use crate::transport::RingClient;

/// Resolve candidate peers of a ring.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Current candidates, possibly partial, possibly containing ourselves.
    async fn discover(&self) -> Result<Vec<NodeRef>>;
}

/// A fixed list of seeds.
#[derive(Clone, Debug, Default)]
pub struct StaticDiscoverer {
    peers: Vec<NodeRef>,
}

impl StaticDiscoverer {
    /// Create a discoverer that always returns `peers`.
    pub fn new(peers: Vec<NodeRef>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl Discoverer for StaticDiscoverer {
    async fn discover(&self) -> Result<Vec<NodeRef>> {
        Ok(self.peers.clone())
    }
}

/// Joins the local node through discovered peers, or forms a singleton ring.
pub struct Bootstrapper {
    dht: Arc<PeerRing>,
    client: Arc<RingClient>,
    router: Arc<Router>,
    discoverer: Arc<dyn Discoverer>,
    attempts: u32,
    backoff: Duration,
}

impl Bootstrapper {
    /// `attempts` rounds of discovery, waiting `backoff * 2^n` after the n-th failed round.
    pub fn new(
        dht: Arc<PeerRing>,
        client: Arc<RingClient>,
        router: Arc<Router>,
        discoverer: Arc<dyn Discoverer>,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            dht,
            client,
            router,
            discoverer,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Ping candidates in order, return the real identity of the first live one.
    /// `Ok(None)` if the list was empty, [Error::PeerUnreachable] if nobody answered.
    async fn first_live_peer(&self) -> Result<Option<NodeRef>> {
        let candidates = self.discoverer.discover().await?;
        let candidates = candidates
            .into_iter()
            .filter(|c| c.address != self.dht.local.address)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut last = None;
        for candidate in candidates {
            match self.client.ping(&candidate).await {
                Ok(real) if real.id == self.dht.id() => {
                    tracing::debug!("[bootstrap] {} is ourselves, skip", candidate.address);
                }
                Ok(real) => return Ok(Some(real)),
                Err(e) => {
                    tracing::warn!("[bootstrap] candidate {} failed: {:?}", candidate.address, e);
                    last = Some(candidate.id);
                }
            }
        }
        match last {
            Some(id) => Err(Error::PeerUnreachable(id)),
            // Every candidate turned out to be ourselves.
            None => Ok(None),
        }
    }

    /// Join through the first live candidate. Returns the bootstrap peer, or `None` if the
    /// node formed a singleton ring.
    pub async fn bootstrap(&self) -> Result<Option<NodeRef>> {
        for attempt in 0..self.attempts {
            match self.first_live_peer().await {
                Ok(None) => {
                    tracing::info!("[bootstrap] {} found no peer, create ring", self.dht.local);
                    self.dht.create()?;
                    return Ok(None);
                }
                Ok(Some(peer)) => match self.router.join(peer.clone()).await {
                    Ok(()) => return Ok(Some(peer)),
                    Err(e) => tracing::warn!("[bootstrap] join via {} failed: {:?}", peer, e),
                },
                Err(e) => tracing::warn!("[bootstrap] attempt {} failed: {:?}", attempt, e),
            }
            if attempt + 1 < self.attempts {
                let wait = self.backoff * 2u32.saturating_pow(attempt);
                tracing::debug!("[bootstrap] retry in {:?}", wait);
                Delay::new(wait).await;
            }
        }
        tracing::warn!(
            "[bootstrap] {} gave up after {} attempts, create ring",
            self.dht.local,
            self.attempts
        );
        self.dht.create()?;
        Ok(None)
    }

    /// Single discovery round for an isolated member, never forms a singleton ring.
    /// Returns whether the node joined somebody.
    pub async fn rejoin(&self) -> Result<bool> {
        match self.first_live_peer().await? {
            Some(peer) => {
                tracing::info!("[bootstrap] {} isolated, rejoin via {}", self.dht.local, peer);
                self.router.join(peer).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
