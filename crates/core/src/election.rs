//! Coordinator election.
//!
//! The coordinator is the reachable member with the smallest [RingId]. It is derived, not
//! voted: a node walks the ring through successor lists and keeps the minimum it saw. The
//! result is an advisory cache, nothing on the data path waits for it.
use std::collections::HashSet;
use std::sync::Arc;

use crate::consts::MAX_ELECTION_HOPS;
use crate::dht::NodeRef;
use crate::dht::PeerRing;
use crate::dht::RingId;
use crate::dht::SuccessorReader;
use crate::error::Result;
use crate::transport::RingClient;

/// Derives and caches the ring coordinator.
pub struct Elector {
    dht: Arc<PeerRing>,
    client: Arc<RingClient>,
}

impl Elector {
    /// Create an elector.
    pub fn new(dht: Arc<PeerRing>, client: Arc<RingClient>) -> Self {
        Self { dht, client }
    }

    /// Walk the ring once and cache the member with the minimum id.
    pub async fn elect(&self) -> Result<NodeRef> {
        let local = self.dht.local.clone();
        let mut best = local.clone();
        let mut visited: HashSet<RingId> = HashSet::from([local.id]);
        let mut frontier = self.dht.successors().list()?;
        let mut hops = 0;

        'walk: while hops < MAX_ELECTION_HOPS {
            // The first reachable member of the current list is the next hop.
            let mut next = None;
            for candidate in frontier.iter() {
                if visited.contains(&candidate.id) {
                    break 'walk;
                }
                match self.client.get_successor_list(candidate).await {
                    Ok(list) => {
                        next = Some((candidate.clone(), list));
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("[elect] skip {}: {:?}", candidate, e);
                        visited.insert(candidate.id);
                    }
                }
            }
            let Some((node, list)) = next else {
                break;
            };
            hops += 1;
            visited.insert(node.id);
            if node.id < best.id {
                best = node;
            }
            frontier = list;
        }

        tracing::debug!("[elect] {} walked {} hops, coordinator {}", local.id, hops, best);
        self.dht.set_coordinator(Some(best.clone()))?;
        Ok(best)
    }

    /// Re-elect when the cached coordinator is unknown or does not answer, then adopt a
    /// smaller live coordinator gossiped by the successor.
    pub async fn check_coordinator(&self) -> Result<()> {
        let current = match self.dht.coordinator()? {
            None => self.elect().await?,
            Some(c) if c.id == self.dht.id() => c,
            Some(c) => match self.client.ping(&c).await {
                Ok(_) => c,
                Err(e) => {
                    tracing::warn!("[elect] coordinator {} unreachable: {:?}", c, e);
                    self.elect().await?
                }
            },
        };

        let Some(succ) = self.dht.successors().get(0)? else {
            return Ok(());
        };
        match self.client.get_coordinator(&succ).await {
            Ok(Some(gossip)) if gossip.id < current.id => {
                if gossip.id == self.dht.id() || self.client.ping(&gossip).await.is_ok() {
                    tracing::info!("[elect] adopt coordinator {} from {}", gossip, succ);
                    self.dht.set_coordinator(Some(gossip))?;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("[elect] gossip from {} failed: {:?}", succ, e),
        }
        Ok(())
    }
}

mod elector {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::FutureExt;
    use futures::pin_mut;
    use futures::select;
    use futures_timer::Delay;

    use super::*;

    impl Elector {
        /// Check the coordinator in a loop.
        pub async fn wait(self: Arc<Self>, interval: Duration) {
            loop {
                let timeout = Delay::new(interval).fuse();
                pin_mut!(timeout);
                select! {
                    _ = timeout => self
                        .check_coordinator()
                        .await
                        .unwrap_or_else(|e| tracing::error!("failed to check coordinator {:?}", e)),
                }
            }
        }
    }
}
