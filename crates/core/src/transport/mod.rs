#![warn(missing_docs)]
//! Outbound rpc of a ring member.
//!
//! The core does not own a network stack. It asks an injected [Transport] to deliver a
//! [Message] to a peer and bring back its [MessageReport]. [RingClient] wraps that with
//! the per call timeout and the typed calls the protocol uses, and feeds every outcome
//! into the failure detector of [PeerRing].
//!
//! Lookups are recursive, so the answer to `find_successor` may depend on peers behind
//! the target. The caller waits one rpc timeout per hop left ([RingClient::lookup_timeout]),
//! which lets a hung peer further down the chain be reported by the hop that called it
//! before the caller gives up on a healthy target.

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::dht::NodeRef;
use crate::dht::PeerRing;
use crate::dht::RingId;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::message::DeleteValueSend;
use crate::message::FindSuccessorSend;
use crate::message::GetCoordinatorSend;
use crate::message::GetPartitionSend;
use crate::message::GetValueSend;
use crate::message::Message;
use crate::message::MessageReport;
use crate::message::NotifyPredecessorSend;
use crate::message::PingSend;
use crate::message::PushReplicaSend;
use crate::message::PutValueSend;
use crate::message::QueryForSuccessorListSend;
use crate::message::QueryForTopoInfoSend;
use crate::message::SetPartitionSend;
use crate::storage::Entry;

/// Reliable point to point request/response channel to a peer.
/// A connection failure must be reported as [Error::PeerUnreachable] with the target id.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `msg` to `target` and wait for its answer.
    async fn call(&self, target: &NodeRef, msg: Message) -> Result<MessageReport>;
}

/// Typed rpc client over a [Transport].
#[derive(Clone)]
pub struct RingClient {
    transport: Arc<dyn Transport>,
    dht: Arc<PeerRing>,
    timeout: Duration,
}

impl RingClient {
    /// Create a client, every call is bounded by `timeout`.
    pub fn new(transport: Arc<dyn Transport>, dht: Arc<PeerRing>, timeout: Duration) -> Self {
        Self {
            transport,
            dht,
            timeout,
        }
    }

    /// The rpc timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// How long a caller waits for a lookup that may still be forwarded `hops` times.
    pub fn lookup_timeout(&self, hops: u32) -> Duration {
        self.timeout.saturating_mul(hops.saturating_add(1))
    }

    /// Send a message and record the outcome against the target.
    pub async fn call(&self, target: &NodeRef, msg: Message) -> Result<MessageReport> {
        self.call_within(target, msg, self.timeout, true).await
    }

    /// Send a message, waiting at most `timeout`. A timeout counts against `target`
    /// only if `strike_on_timeout` is set.
    async fn call_within(
        &self,
        target: &NodeRef,
        msg: Message,
        timeout: Duration,
        strike_on_timeout: bool,
    ) -> Result<MessageReport> {
        tracing::debug!("rpc {} -> {}", msg.method(), target);
        let call = self.transport.call(target, msg).fuse();
        let delay = Delay::new(timeout).fuse();
        pin_mut!(call, delay);

        let (ret, timed_out) = select! {
            r = call => (r, false),
            _ = delay => (Err(Error::PeerUnreachable(target.id)), true),
        };

        match &ret {
            Ok(_) => self.dht.record_success(target.id),
            Err(Error::PeerUnreachable(id)) if *id == target.id => {
                if timed_out && !strike_on_timeout {
                    tracing::debug!("rpc to {} cut short after {:?}", target, timeout);
                } else if let Err(e) = self.dht.mark_unreachable(target) {
                    tracing::error!("failed to record unreachable peer {}: {:?}", target, e);
                }
            }
            Err(_) => {}
        }
        ret
    }

    /// Ask `target` to resolve the successor of `id` with `hops` left, waiting at most
    /// `timeout`. A wait shorter than [RingClient::lookup_timeout] is the caller's own
    /// deadline, so running out of it does not count against `target`.
    pub async fn find_successor(
        &self,
        target: &NodeRef,
        id: RingId,
        hops: u32,
        timeout: Duration,
    ) -> Result<NodeRef> {
        let full = timeout >= self.lookup_timeout(hops);
        self.call_within(
            target,
            Message::FindSuccessor(FindSuccessorSend { id, hops }),
            timeout,
            full,
        )
        .await?
        .into_node()
    }

    /// Tell `target` about a predecessor candidate, returns target's predecessor after it.
    pub async fn notify(&self, target: &NodeRef, candidate: NodeRef) -> Result<NodeRef> {
        self.call(target, Message::Notify(NotifyPredecessorSend { candidate }))
            .await?
            .into_node()
    }

    /// Successor list of `target`.
    pub async fn get_successor_list(&self, target: &NodeRef) -> Result<Vec<NodeRef>> {
        self.call(target, Message::GetSuccessorList(QueryForSuccessorListSend {}))
            .await?
            .into_nodes()
    }

    /// Predecessor and successor list of `target`.
    pub async fn query_topo_info(&self, target: &NodeRef) -> Result<TopoInfo> {
        self.call(target, Message::QueryTopoInfo(QueryForTopoInfoSend {}))
            .await?
            .into_topo_info()
    }

    /// Forward a write.
    pub async fn put(&self, target: &NodeRef, key: &str, value: Vec<u8>, forwarded: bool) -> Result<()> {
        self.call(
            target,
            Message::Put(PutValueSend {
                key: key.to_string(),
                value,
                forwarded,
            }),
        )
        .await?
        .into_ack()
    }

    /// Forward a read.
    pub async fn get(&self, target: &NodeRef, key: &str, forwarded: bool) -> Result<Option<Vec<u8>>> {
        self.call(
            target,
            Message::Get(GetValueSend {
                key: key.to_string(),
                forwarded,
            }),
        )
        .await?
        .into_value()
    }

    /// Forward a delete.
    pub async fn delete(&self, target: &NodeRef, key: &str, forwarded: bool) -> Result<bool> {
        self.call(
            target,
            Message::Delete(DeleteValueSend {
                key: key.to_string(),
                forwarded,
            }),
        )
        .await?
        .into_removed()
    }

    /// Copy one entry to a replica holder.
    pub async fn push_replica(&self, target: &NodeRef, key: &str, entry: Entry) -> Result<()> {
        self.call(
            target,
            Message::PushReplica(PushReplicaSend {
                key: key.to_string(),
                entry,
            }),
        )
        .await?
        .into_ack()
    }

    /// Liveness check, answers with the identity of `target`.
    pub async fn ping(&self, target: &NodeRef) -> Result<NodeRef> {
        self.call(target, Message::Ping(PingSend {}))
            .await?
            .into_node()
    }

    /// Pull `(start, end]` from `target`.
    pub async fn get_partition(
        &self,
        target: &NodeRef,
        start: RingId,
        end: RingId,
    ) -> Result<Vec<(String, Entry)>> {
        self.call(target, Message::GetPartition(GetPartitionSend { start, end }))
            .await?
            .into_entries()
    }

    /// Push a batch of entries to `target`.
    pub async fn set_partition(&self, target: &NodeRef, entries: Vec<(String, Entry)>) -> Result<()> {
        self.call(target, Message::SetPartition(SetPartitionSend { entries }))
            .await?
            .into_ack()
    }

    /// Coordinator cached by `target`.
    pub async fn get_coordinator(&self, target: &NodeRef) -> Result<Option<NodeRef>> {
        self.call(target, Message::GetCoordinator(GetCoordinatorSend {}))
            .await?
            .into_maybe_node()
    }
}
