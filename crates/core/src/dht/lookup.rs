//! Multi hop `find_successor`.
//!
//! A lookup is recursive: each member resolves what it can locally and forwards the rest
//! to its closest preceding finger, passing along the hops that remain. A hop that does
//! not answer is excluded and the next best candidate is tried, so one dead finger
//! costs one timeout rather than the lookup.
//!
//! Every lookup runs against a time allowance. A forwarded lookup with `h` hops left gets
//! less time than the caller waits for it, so when a peer deep in the chain hangs, the hop
//! that called it answers first and the caller never blames a healthy hop.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::dht::types::Chord;
use crate::dht::NodeRef;
use crate::dht::PeerRing;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::dht::RingId;
use crate::error::Error;
use crate::error::Result;
use crate::transport::RingClient;

/// Drives lookups over the ring.
#[derive(Clone)]
pub struct Router {
    dht: Arc<PeerRing>,
    client: Arc<RingClient>,
    hop_budget: u32,
}

impl Router {
    /// Create a router, lookups started here may take at most `hop_budget` hops.
    pub fn new(dht: Arc<PeerRing>, client: Arc<RingClient>, hop_budget: u32) -> Self {
        Self {
            dht,
            client,
            hop_budget,
        }
    }

    /// Budget of lookups started on this node.
    pub fn hop_budget(&self) -> u32 {
        self.hop_budget
    }

    /// Resolve the member responsible for `id`.
    pub async fn find_successor(&self, id: RingId) -> Result<NodeRef> {
        let allowance = self.client.lookup_timeout(self.hop_budget);
        self.route_within(id, self.hop_budget, allowance).await
    }

    /// Resolve `id` for a peer that forwarded the lookup with `hops` left.
    /// The answer must arrive before the peer's own wait of
    /// [RingClient::lookup_timeout] runs out, so half an rpc timeout is kept in reserve.
    pub async fn route(&self, id: RingId, hops: u32) -> Result<NodeRef> {
        let allowance = self
            .client
            .lookup_timeout(hops)
            .saturating_sub(self.client.timeout() / 2);
        self.route_within(id, hops, allowance).await
    }

    /// Resolve the member responsible for `id` with `hops` forwards left, giving up once
    /// `allowance` is spent.
    pub async fn route_within(&self, id: RingId, hops: u32, allowance: Duration) -> Result<NodeRef> {
        let started = Instant::now();
        let mut excluded: Vec<RingId> = vec![];
        loop {
            let next = match self.dht.next_hop(id, &excluded)? {
                PeerRingAction::Some(n) => return Ok(n),
                PeerRingAction::RemoteAction(next, PeerRingRemoteAction::FindSuccessor(_)) => next,
                PeerRingAction::None => {
                    return Err(match excluded.last() {
                        Some(last) => Error::PeerUnreachable(*last),
                        None => Error::RingInconsistent(format!("no route to {}", id)),
                    });
                }
                act => return Err(Error::PeerRingUnexpectedAction(act)),
            };

            if hops == 0 {
                tracing::warn!("[lookup] {} ran out of hops looking for {}", self.dht.id(), id);
                return Err(Error::RoutingHopBudgetExceeded(self.hop_budget));
            }

            let left = allowance.saturating_sub(started.elapsed());
            if left.is_zero() {
                tracing::debug!("[lookup] {} out of time looking for {}", self.dht.id(), id);
                return Err(Error::PeerUnreachable(
                    excluded.last().copied().unwrap_or(next.id),
                ));
            }
            let timeout = left.min(self.client.lookup_timeout(hops - 1));

            match self.client.find_successor(&next, id, hops - 1, timeout).await {
                Ok(found) => {
                    // `next` precedes id, so id must lie in (next, found].
                    if !self.dht.space.in_range_incl(id, next.id, found.id) {
                        tracing::warn!(
                            "[lookup] inconsistent answer from {}: {} is not the successor of {}",
                            next,
                            found,
                            id
                        );
                        return Err(Error::RingInconsistent(format!(
                            "{} answered {} for {}",
                            next.id, found.id, id
                        )));
                    }
                    return Ok(found);
                }
                Err(Error::PeerUnreachable(pid)) if pid == next.id => {
                    tracing::debug!("[lookup] hop {} unreachable, try next candidate", next);
                    excluded.push(next.id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Join the ring through `bootstrap`: ask it for our successor and record the answer.
    pub async fn join(&self, bootstrap: NodeRef) -> Result<()> {
        match self.dht.join(bootstrap)? {
            PeerRingAction::None => Ok(()),
            PeerRingAction::RemoteAction(
                via,
                PeerRingRemoteAction::FindSuccessorForJoin(id),
            ) => {
                let timeout = self.client.lookup_timeout(self.hop_budget);
                let succ = self
                    .client
                    .find_successor(&via, id, self.hop_budget, timeout)
                    .await?;
                tracing::info!(
                    "[bootstrap] {} joined via {}, successor {}",
                    self.dht.id(),
                    via,
                    succ
                );
                self.dht.join_with_successor(succ)
            }
            act => Err(Error::PeerRingUnexpectedAction(act)),
        }
    }
}
