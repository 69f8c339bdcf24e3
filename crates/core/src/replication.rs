//! Keep every key on the responsible node plus R-1 successors.
//!
//! Local writes are acknowledged before they replicate: [Replicator::enqueue] only queues
//! the entry and the next pass pushes it to the current replica targets. Besides draining the
//! queue, a pass follows topology changes:
//!
//! * when the range this node answers for grows, the grown part is pulled from successors
//!   before the node reports itself caught up;
//! * when it shrinks because a closer predecessor was adopted, the lost part is handed to
//!   that predecessor;
//! * when a new node enters the replica targets, every owned entry is pushed to it. A
//!   target that missed a push is treated like a new one, so it gets the full set once it
//!   answers again;
//! * from time to time every owned entry is pushed to every target again, and entries
//!   this node holds for nobody are handed to their owner and purged.
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use futures::channel::mpsc;
use futures::lock::Mutex as AsyncMutex;

use crate::consts::RESOLVE_EVERY;
use crate::dht::NodeRef;
use crate::dht::NodeState;
use crate::dht::PeerRing;
use crate::dht::RingId;
use crate::dht::Router;
use crate::dht::SuccessorReader;
use crate::error::Error;
use crate::error::Result;
use crate::storage::Entry;
use crate::storage::VersionedStore;
use crate::transport::RingClient;

type Pending = (String, Entry);

/// Replication driver of a ring member.
pub struct Replicator {
    dht: Arc<PeerRing>,
    client: Arc<RingClient>,
    router: Arc<Router>,
    store: Arc<VersionedStore>,
    factor: usize,
    sender: mpsc::UnboundedSender<Pending>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Pending>>,
    last_targets: Mutex<Vec<NodeRef>>,
    range_start: Mutex<Option<RingId>>,
    passes: AtomicU32,
    caught_up: AtomicBool,
}

impl Replicator {
    /// Create a replicator keeping `factor` copies of each key.
    pub fn new(
        dht: Arc<PeerRing>,
        client: Arc<RingClient>,
        router: Arc<Router>,
        store: Arc<VersionedStore>,
        factor: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            dht,
            client,
            router,
            store,
            factor,
            sender,
            receiver: AsyncMutex::new(receiver),
            last_targets: Mutex::new(vec![]),
            range_start: Mutex::new(None),
            passes: AtomicU32::new(0),
            caught_up: AtomicBool::new(false),
        }
    }

    /// Replication factor.
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Whether the node pulled every range it became responsible for.
    pub fn caught_up(&self) -> bool {
        self.caught_up.load(Ordering::SeqCst)
    }

    fn lock_range_start(&self) -> Result<std::sync::MutexGuard<Option<RingId>>> {
        self.range_start.lock().map_err(|_| Error::DHTSyncLockError)
    }

    fn lock_last_targets(&self) -> Result<std::sync::MutexGuard<Vec<NodeRef>>> {
        self.last_targets.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Queue a local write for replication.
    pub fn enqueue(&self, key: &str, entry: Entry) -> Result<()> {
        self.sender
            .unbounded_send((key.to_string(), entry))
            .map_err(|_| Error::ReplicationQueueClosed)
    }

    /// Run one replication pass.
    pub async fn replicate(&self) -> Result<()> {
        if self.dht.state()? == NodeState::Leaving {
            return Ok(());
        }
        if let Err(e) = self.drain_pending().await {
            tracing::error!("[replicate] Failed on drain queue {:?}", e);
        }
        if let Err(e) = self.sync_range().await {
            tracing::error!("[replicate] Failed on sync range {:?}", e);
        }
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        if pass % RESOLVE_EVERY == 0 {
            // anti-entropy: every current target gets the full owned set again
            self.lock_last_targets()?.clear();
        }
        if let Err(e) = self.sync_targets().await {
            tracing::error!("[replicate] Failed on sync targets {:?}", e);
        }
        if pass % RESOLVE_EVERY == 0 {
            if let Err(e) = self.resolve_replicas().await {
                tracing::error!("[replicate] Failed on resolve replicas {:?}", e);
            }
        }
        Ok(())
    }

    /// Push queued writes to the current replica targets.
    /// A target stops receiving pushes at its first failure and is resynced in full by
    /// [Replicator::sync_targets] once it answers again.
    pub async fn drain_pending(&self) -> Result<usize> {
        let mut pending = vec![];
        {
            let mut receiver = self.receiver.lock().await;
            while let Ok(item) = receiver.try_recv() {
                pending.push(item);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let targets = self.dht.replica_targets(self.factor.saturating_sub(1))?;
        let mut missed = vec![];
        for target in targets.iter() {
            for (key, entry) in pending.iter() {
                if let Err(e) = self.client.push_replica(target, key, entry.clone()).await {
                    tracing::warn!("[replicate] push {} to {} failed: {:?}", key, target, e);
                    missed.push(target.id);
                    break;
                }
            }
        }
        if !missed.is_empty() {
            self.lock_last_targets()?.retain(|t| !missed.contains(&t.id));
        }
        tracing::debug!(
            "[replicate] pushed {} writes to {} of {} targets",
            pending.len(),
            targets.len() - missed.len(),
            targets.len()
        );
        Ok(pending.len())
    }

    /// Follow changes of `(predecessor, self]`.
    pub async fn sync_range(&self) -> Result<()> {
        let local = self.dht.id();
        let pred = self.dht.predecessor()?;
        let start = *self.lock_range_start()?;

        match (start, pred) {
            (None, None) => {
                if self.dht.successors().is_empty()? {
                    // Alone on the ring, nothing to pull.
                    *self.lock_range_start()? = Some(local);
                    self.caught_up.store(true, Ordering::SeqCst);
                }
            }
            (_, None) => {}
            (None, Some(p)) => {
                self.caught_up.store(false, Ordering::SeqCst);
                // range_start stays unset until a pull succeeded, so a failed one is retried
                self.pull(p.id, local).await?;
                *self.lock_range_start()? = Some(p.id);
                self.caught_up.store(true, Ordering::SeqCst);
                tracing::info!("[replicate] {} caught up on ({}, {}]", local, p.id, local);
            }
            (Some(q), Some(p)) if q != p.id => {
                if self.dht.space.in_range(p.id, q, local) {
                    // A closer predecessor took (q, p].
                    self.delegate(&p, q).await?;
                } else {
                    self.caught_up.store(false, Ordering::SeqCst);
                    self.pull(p.id, q).await?;
                    self.caught_up.store(true, Ordering::SeqCst);
                }
                *self.lock_range_start()? = Some(p.id);
            }
            _ => {}
        }
        Ok(())
    }

    /// Pull `(start, end]` from every successor and merge it.
    /// Fails with [Error::PullFailed] when successors are known but none answered.
    async fn pull(&self, start: RingId, end: RingId) -> Result<()> {
        let successors = self.dht.successors().list()?;
        let mut merged = 0;
        let mut answered = 0;
        for succ in successors.iter() {
            match self.client.get_partition(succ, start, end).await {
                Ok(entries) => {
                    answered += 1;
                    merged += self.store.apply_all(entries).await?;
                }
                Err(e) => tracing::warn!("[replicate] pull from {} failed: {:?}", succ, e),
            }
        }
        if answered == 0 && !successors.is_empty() {
            return Err(Error::PullFailed(start, end));
        }
        tracing::debug!(
            "[replicate] pulled ({}, {}] from {} successors, {} entries merged",
            start,
            end,
            answered,
            merged
        );
        Ok(())
    }

    /// Hand `(start, pred]` to `pred`.
    async fn delegate(&self, pred: &NodeRef, start: RingId) -> Result<()> {
        let entries = self.store.range(start, pred.id).await?;
        if entries.is_empty() {
            return Ok(());
        }
        tracing::info!(
            "[replicate] delegate {} entries of ({}, {}] to {}",
            entries.len(),
            start,
            pred.id,
            pred
        );
        self.client.set_partition(pred, entries).await
    }

    /// Push every owned entry to replica targets that were not targets on the last pass.
    pub async fn sync_targets(&self) -> Result<()> {
        let targets = self.dht.replica_targets(self.factor.saturating_sub(1))?;
        let added = {
            let last = self.lock_last_targets()?;
            targets
                .iter()
                .filter(|t| !last.contains(t))
                .cloned()
                .collect::<Vec<_>>()
        };
        if added.is_empty() {
            *self.lock_last_targets()? = targets;
            return Ok(());
        }

        let owned = self.owned_entries().await?;
        let mut synced = vec![];
        for target in added.iter() {
            if owned.is_empty() {
                synced.push(target.clone());
                continue;
            }
            match self.client.set_partition(target, owned.clone()).await {
                Ok(()) => {
                    tracing::debug!("[replicate] {} owned entries sent to {}", owned.len(), target);
                    synced.push(target.clone());
                }
                Err(e) => tracing::warn!("[replicate] sync to {} failed: {:?}", target, e),
            }
        }
        // A target that failed stays out so the next pass retries it.
        *self.lock_last_targets()? = targets
            .into_iter()
            .filter(|t| !added.contains(t) || synced.contains(t))
            .collect();
        Ok(())
    }

    async fn owned_entries(&self) -> Result<Vec<(String, Entry)>> {
        let mut owned = vec![];
        for (key, entry) in self.store.entries().await? {
            if self.dht.owns(self.store.key_id(&key))? {
                owned.push((key, entry));
            }
        }
        Ok(owned)
    }

    /// Hand entries this node neither owns nor replicates to their responsible node.
    /// An entry is purged only after its owner accepted it.
    pub async fn resolve_replicas(&self) -> Result<usize> {
        if self.dht.predecessor()?.is_none() {
            return Ok(0);
        }
        let local = self.dht.id();
        let replicas = self.factor.saturating_sub(1);
        let mut lists: HashMap<RingId, Vec<NodeRef>> = HashMap::new();
        let mut moves: HashMap<RingId, (NodeRef, Vec<(String, Entry)>)> = HashMap::new();

        for (key, entry) in self.store.entries().await? {
            let id = self.store.key_id(&key);
            if self.dht.owns(id)? {
                continue;
            }
            let owner = match self.router.find_successor(id).await {
                Ok(owner) => owner,
                Err(e) => {
                    tracing::debug!("[replicate] cannot resolve owner of {}: {:?}", key, e);
                    continue;
                }
            };
            if owner.id == local {
                continue;
            }
            if !lists.contains_key(&owner.id) {
                let list = self
                    .client
                    .get_successor_list(&owner)
                    .await
                    .unwrap_or_default();
                lists.insert(owner.id, list);
            }
            let holds = lists
                .get(&owner.id)
                .map(|l| l.iter().take(replicas).any(|n| n.id == local))
                .unwrap_or(false);
            if holds {
                continue;
            }
            moves
                .entry(owner.id)
                .or_insert_with(|| (owner.clone(), vec![]))
                .1
                .push((key, entry));
        }

        let mut moved = 0;
        for (_, (owner, entries)) in moves {
            let keys = entries.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>();
            match self.client.set_partition(&owner, entries).await {
                Ok(()) => {
                    for key in keys.iter() {
                        self.store.purge(key).await?;
                    }
                    tracing::info!("[replicate] moved {} entries to {}", keys.len(), owner);
                    moved += keys.len();
                }
                Err(e) => tracing::warn!("[replicate] hand off to {} failed: {:?}", owner, e),
            }
        }
        Ok(moved)
    }
}

mod replicator {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::FutureExt;
    use futures::pin_mut;
    use futures::select;
    use futures_timer::Delay;

    use super::*;

    impl Replicator {
        /// Run replication in a loop.
        pub async fn wait(self: Arc<Self>, interval: Duration) {
            loop {
                let timeout = Delay::new(interval).fuse();
                pin_mut!(timeout);
                select! {
                    _ = timeout => self
                        .replicate()
                        .await
                        .unwrap_or_else(|e| tracing::error!("failed to replicate {:?}", e)),
                }
            }
        }
    }
}
