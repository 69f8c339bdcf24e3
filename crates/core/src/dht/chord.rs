//! Chord algorithm implement.
#![warn(missing_docs)]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;

use super::id::BiasId;
use super::successor::SuccessorSeq;
use super::types::Chord;
use super::types::CorrectChord;
use super::FingerTable;
use crate::consts::DEAD_PEER_STRIKES;
use crate::dht::NodeRef;
use crate::dht::RingId;
use crate::dht::RingSpace;
use crate::dht::SuccessorReader;
use crate::dht::SuccessorWriter;
use crate::error::Error;
use crate::error::Result;

/// Lifecycle of a ring member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Knows a successor, waiting for a predecessor and a confirmed successor.
    Joining,
    /// Full ring member.
    Active,
    /// Handed its keys off and stopped serving.
    Leaving,
    /// Observed by peers only, a node never enters it by itself.
    Failed,
}

/// PeerRing is used to help a node interact with other nodes.
/// All nodes form a clockwise ring in the order of [RingId].
/// This struct takes its name from that.
/// PeerRing implemented [Chord] algorithm.
pub struct PeerRing {
    /// The local member.
    pub local: NodeRef,
    /// The identifier space shared by the whole ring.
    pub space: RingSpace,
    /// [FingerTable] help node to find successor quickly.
    pub finger: Arc<Mutex<FingerTable>>,
    /// The next node on the ring.
    /// The [SuccessorSeq] may contain multiple nodes for fault tolerance.
    pub successor_seq: SuccessorSeq,
    /// The previous node on the ring.
    pub predecessor: Arc<Mutex<Option<NodeRef>>>,
    state: Arc<Mutex<NodeState>>,
    successor_confirmed: AtomicBool,
    coordinator: Arc<Mutex<Option<NodeRef>>>,
    strikes: DashMap<RingId, Strikes>,
    tick: AtomicU64,
}

/// Failed rpcs against one peer. At most one is counted per stabilization tick.
#[derive(Clone, Copy, Debug, Default)]
struct Strikes {
    count: u8,
    tick: u64,
}

/// Type alias is just for making the code easy to read.
type Target = NodeRef;

/// `PeerRing` use this to describe the result of [Chord] algorithm. Sometimes it's a
/// direct result, sometimes it's an action that is continued externally.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerRingAction {
    /// No result, the whole manipulation is done internally.
    None,
    /// Found some node.
    Some(NodeRef),
    /// Trigger a remote action.
    RemoteAction(Target, RemoteAction),
    /// Trigger multiple remote actions.
    MultiActions(Vec<PeerRingAction>),
}

/// Some of the process needs to be done remotely. This enum is used to describe that.
/// The driver (see [Stabilizer](super::Stabilizer) and [Router](super::Router)) performs
/// the rpc and feeds the answer back into `PeerRing`.
///
/// To avoid ambiguity, in the following comments, `node_a` is the target declared in
/// [PeerRingAction]. Other ids are the fields declared in this [RemoteAction].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAction {
    /// Need `node_a` to find `id_b`.
    FindSuccessor(RingId),
    /// Need `node_a` to find the successor of the joining local node.
    FindSuccessorForJoin(RingId),
    /// Need `node_a` to find `id_b` then send back with `for finger table fixing` flag.
    FindSuccessorForFix(RingId),
    /// Let `node_a` [notify](Chord::notify) `node_b`.
    Notify(NodeRef),
    /// Fetch successor_list and pred from successor
    QueryForSuccessorListAndPred,
    /// Ping predecessor, clear it on failure.
    CheckPredecessor,
}

/// Information about successor and predecessor
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone)]
pub struct TopoInfo {
    /// Successor list
    pub successors: Vec<NodeRef>,
    /// Predecessor
    pub predecessor: Option<NodeRef>,
}

impl TryFrom<&PeerRing> for TopoInfo {
    type Error = Error;
    fn try_from(dht: &PeerRing) -> Result<TopoInfo> {
        let successors = dht.successors().list()?;
        let predecessor = dht.lock_predecessor()?.clone();
        Ok(TopoInfo {
            successors,
            predecessor,
        })
    }
}

impl From<Vec<PeerRingAction>> for PeerRingAction {
    fn from(acts: Vec<PeerRingAction>) -> Self {
        if !acts.is_empty() {
            Self::MultiActions(acts)
        } else {
            Self::None
        }
    }
}

impl PeerRing {
    /// Create a ring member that knows nobody yet.
    pub fn new(local: NodeRef, space: RingSpace, succ_max: u8) -> Self {
        Self {
            successor_seq: SuccessorSeq::new(local.clone(), space, succ_max),
            predecessor: Arc::new(Mutex::new(None)),
            finger: Arc::new(Mutex::new(FingerTable::new(local.id, space))),
            state: Arc::new(Mutex::new(NodeState::Joining)),
            successor_confirmed: AtomicBool::new(false),
            coordinator: Arc::new(Mutex::new(None)),
            strikes: DashMap::new(),
            tick: AtomicU64::new(0),
            local,
            space,
        }
    }

    /// Id of local node.
    pub fn id(&self) -> RingId {
        self.local.id
    }

    /// Return successor sequence
    pub fn successors(&self) -> SuccessorSeq {
        self.successor_seq.clone()
    }

    /// Lock and return MutexGuard of finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of predecessor.
    pub fn lock_predecessor(&self) -> Result<MutexGuard<Option<NodeRef>>> {
        self.predecessor.lock().map_err(|_| Error::DHTSyncLockError)
    }

    fn lock_state(&self) -> Result<MutexGuard<NodeState>> {
        self.state.lock().map_err(|_| Error::DHTSyncLockError)
    }

    fn lock_coordinator(&self) -> Result<MutexGuard<Option<NodeRef>>> {
        self.coordinator.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Snapshot of predecessor.
    pub fn predecessor(&self) -> Result<Option<NodeRef>> {
        Ok(self.lock_predecessor()?.clone())
    }

    /// Current [NodeState].
    pub fn state(&self) -> Result<NodeState> {
        Ok(*self.lock_state()?)
    }

    /// Overwrite [NodeState].
    pub fn set_state(&self, state: NodeState) -> Result<()> {
        let mut s = self.lock_state()?;
        if *s != state {
            tracing::info!("[membership] {} {:?} -> {:?}", self.local, *s, state);
            *s = state;
        }
        Ok(())
    }

    /// Cached coordinator.
    pub fn coordinator(&self) -> Result<Option<NodeRef>> {
        Ok(self.lock_coordinator()?.clone())
    }

    /// Cache the result of an election.
    pub fn set_coordinator(&self, node: Option<NodeRef>) -> Result<()> {
        let mut c = self.lock_coordinator()?;
        if *c != node {
            tracing::info!("[elect] {} coordinator is now {:?}", self.local.id, node);
            *c = node;
        }
        Ok(())
    }

    /// Form a singleton ring, the local node is its own successor and has no predecessor.
    pub fn create(&self) -> Result<()> {
        let mut finger = self.lock_finger()?;
        let successors = self.successors();
        for s in successors.list()? {
            successors.remove(s.id)?;
        }
        *finger = FingerTable::new(self.local.id, self.space);
        *self.lock_predecessor()? = None;
        self.successor_confirmed.store(false, Ordering::SeqCst);
        self.strikes.clear();
        drop(finger);
        self.set_state(NodeState::Active)
    }

    /// Record the answer of [RemoteAction::FindSuccessorForJoin].
    pub fn join_with_successor(&self, succ: NodeRef) -> Result<()> {
        if succ.id == self.local.id {
            return Ok(());
        }
        let mut finger = self.lock_finger()?;
        finger.join(&succ);
        self.successors().update(succ)?;
        Ok(())
    }

    /// Remove a node from finger table.
    /// Also remove it from successor sequence.
    /// If successor_seq become empty, try setting the closest node to it.
    pub fn remove(&self, id: RingId) -> Result<()> {
        let mut finger = self.lock_finger()?;
        let successor = self.successors();
        let mut predecessor = self.lock_predecessor()?;
        if predecessor.as_ref().map(|p| p.id) == Some(id) {
            *predecessor = None;
        }
        finger.remove(id);
        successor.remove(id)?;
        if successor.is_empty()? {
            if let Some(x) = finger.first() {
                successor.update(x)?;
            }
        }
        Ok(())
    }

    /// Start a stabilization tick, returns its number.
    pub fn begin_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of the current stabilization tick.
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Count a failed rpc against `node`. Failures within one stabilization tick count
    /// once, so a peer is declared dead only after [DEAD_PEER_STRIKES] distinct ticks.
    /// Returns `true` when the node is dead and was evicted from routing state.
    pub fn mark_unreachable(&self, node: &NodeRef) -> Result<bool> {
        if node.id == self.local.id {
            return Ok(false);
        }
        let tick = self.current_tick();
        let (count, counted) = {
            let mut entry = self.strikes.entry(node.id).or_default();
            let counted = entry.count == 0 || entry.tick != tick;
            if counted {
                entry.count = entry.count.saturating_add(1);
                entry.tick = tick;
            }
            (entry.count, counted)
        };
        if counted {
            tracing::warn!("peer {} unreachable, strike {} at tick {}", node, count, tick);
        }
        if count >= DEAD_PEER_STRIKES {
            if counted && count == DEAD_PEER_STRIKES {
                tracing::info!("[membership] peer {} is considered FAILED", node);
            }
            // Strikes are kept so peers gossiping a dead node do not bring it back.
            self.remove(node.id)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether `id` crossed [DEAD_PEER_STRIKES] and has not answered since.
    pub fn is_dead(&self, id: RingId) -> bool {
        self.strikes(id) >= DEAD_PEER_STRIKES
    }

    /// A successful rpc resets the failure counter of a peer.
    pub fn record_success(&self, id: RingId) {
        self.strikes.remove(&id);
    }

    /// Current strike count of a peer.
    pub fn strikes(&self, id: RingId) -> u8 {
        self.strikes.get(&id).map(|s| s.count).unwrap_or(0)
    }

    /// Successor answered an rpc during stabilization.
    pub fn confirm_successor(&self) {
        self.successor_confirmed.store(true, Ordering::SeqCst);
    }

    /// JOINING -> ACTIVE once a predecessor is known and a successor is confirmed.
    pub fn try_activate(&self) -> Result<bool> {
        if self.state()? != NodeState::Joining {
            return Ok(false);
        }
        let has_pred = self.lock_predecessor()?.is_some();
        if has_pred && self.successor_confirmed.load(Ordering::SeqCst) {
            self.set_state(NodeState::Active)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop predecessor if it is still `id`.
    pub fn clear_predecessor(&self, id: RingId) -> Result<()> {
        let mut predecessor = self.lock_predecessor()?;
        if predecessor.as_ref().map(|p| p.id) == Some(id) {
            tracing::info!("[check_predecessor] {} clear predecessor {}", self.local.id, id);
            *predecessor = None;
        }
        Ok(())
    }

    /// A node that lost every successor and has no predecessor is isolated.
    pub fn is_isolated(&self) -> Result<bool> {
        Ok(self.successors().is_empty()? && self.lock_predecessor()?.is_none())
    }

    /// Whether local node is responsible for `id`, i.e. `id <- (predecessor, self]`.
    /// Without a predecessor, only a node alone on its ring claims everything.
    pub fn owns(&self, id: RingId) -> Result<bool> {
        match &*self.lock_predecessor()? {
            Some(p) => Ok(self.space.in_range_incl(id, p.id, self.local.id)),
            None => self.successors().is_empty(),
        }
    }

    /// First `n` successors, the nodes holding replicas of what local node owns.
    pub fn replica_targets(&self, n: usize) -> Result<Vec<NodeRef>> {
        let mut list = self.successors().list()?;
        list.truncate(n);
        Ok(list)
    }

    /// Calculate bias of the id on the ring.
    pub fn bias(&self, id: RingId) -> BiasId {
        self.space.bias(self.local.id, id)
    }

    /// Replace predecessor with `candidate` if it is closer (or there was none).
    /// Returns the predecessor before and after, both under one lock.
    pub fn rectify_predecessor(
        &self,
        candidate: NodeRef,
    ) -> Result<(Option<NodeRef>, NodeRef)> {
        let mut predecessor = self.lock_predecessor()?;
        let old = predecessor.clone();
        if candidate.id == self.local.id {
            return Ok((old.clone(), old.unwrap_or_else(|| self.local.clone())));
        }

        match old.clone() {
            Some(pre) => {
                // If candidate is closer to self than predecessor, set it to the predecessor.
                // Otherwise tell the real predecessor back.
                if self.space.in_range(candidate.id, pre.id, self.local.id) {
                    tracing::info!(
                        "[notify] {} predecessor {} -> {}",
                        self.local.id,
                        pre.id,
                        candidate.id
                    );
                    *predecessor = Some(candidate.clone());
                    Ok((old, candidate))
                } else {
                    Ok((old, pre))
                }
            }
            None => {
                tracing::info!("[notify] {} predecessor -> {}", self.local.id, candidate.id);
                *predecessor = Some(candidate.clone());
                Ok((old, candidate))
            }
        }
    }

    /// Routing step toward the successor of `id`, skipping the nodes in `excluded`.
    ///
    /// * `id <- (predecessor, self]`: the local node.
    /// * `id <- (self, successor]`: the successor.
    /// * otherwise: forward to the closest preceding finger, or to the nearest
    ///   successor preceding `id` if no finger qualifies.
    ///
    /// [PeerRingAction::None] means every candidate hop is excluded.
    pub fn next_hop(&self, id: RingId, excluded: &[RingId]) -> Result<PeerRingAction> {
        let successors = self.successors().list()?;
        let Some(succ) = successors.first().cloned() else {
            // Alone on the ring.
            return Ok(PeerRingAction::Some(self.local.clone()));
        };

        if let Some(pred) = &*self.lock_predecessor()? {
            if self.space.in_range_incl(id, pred.id, self.local.id) {
                return Ok(PeerRingAction::Some(self.local.clone()));
            }
        }

        if id == self.local.id {
            return Ok(PeerRingAction::Some(self.local.clone()));
        }

        if self.space.in_range_incl(id, self.local.id, succ.id) {
            return Ok(PeerRingAction::Some(succ));
        }

        let finger = self.lock_finger()?;
        let next = finger.closest_preceding(id, excluded).or_else(|| {
            successors
                .iter()
                .rev()
                .find(|s| !excluded.contains(&s.id) && self.space.in_range(s.id, self.local.id, id))
                .cloned()
        });

        let ret = match next {
            Some(n) => PeerRingAction::RemoteAction(n, RemoteAction::FindSuccessor(id)),
            None => PeerRingAction::None,
        };
        tracing::debug!(
            "find_successor: self: {}, id: {}, successor: {}, result: {:?}",
            self.local.id,
            id,
            succ,
            ret
        );
        Ok(ret)
    }
}

impl Chord<PeerRingAction> for PeerRing {
    /// Join a ring containing `bootstrap`.
    /// This method will return a [RemoteAction::FindSuccessorForJoin] to the caller.
    /// The caller will send it to `bootstrap` and feed the answer to
    /// [PeerRing::join_with_successor].
    fn join(&self, bootstrap: NodeRef) -> Result<PeerRingAction> {
        if bootstrap.id == self.local.id {
            return Ok(PeerRingAction::None);
        }
        self.set_state(NodeState::Joining)?;
        self.successor_confirmed.store(false, Ordering::SeqCst);
        Ok(PeerRingAction::RemoteAction(
            bootstrap,
            RemoteAction::FindSuccessorForJoin(self.local.id),
        ))
    }

    /// Find the successor of an id.
    /// May return a remote action for the successor is recorded in another node.
    fn find_successor(&self, id: RingId) -> Result<PeerRingAction> {
        self.next_hop(id, &[])
    }

    /// Handle notification from a node that thinks it is the predecessor of current node.
    /// If that node is closer to current node or current node has no predecessor, set it.
    /// This method will return current predecessor after setting.
    fn notify(&self, candidate: NodeRef) -> Result<NodeRef> {
        let (_, current) = self.rectify_predecessor(candidate)?;
        Ok(current)
    }

    /// Fix finger table by finding the successor for each finger.
    /// Only one finger is fixed at a time, round robin over the table.
    fn fix_fingers(&self) -> Result<PeerRingAction> {
        let index = self.lock_finger()?.next_fix_index();
        let start = self.space.finger_start(self.local.id, index);

        // Caution here that there are also locks in find_successor.
        // You cannot lock finger table before calling find_successor.
        match self.find_successor(start)? {
            PeerRingAction::Some(v) => {
                let mut finger = self.lock_finger()?;
                if v.id == self.local.id {
                    // Nobody else covers this finger.
                    return Ok(PeerRingAction::None);
                }
                finger.set(index as usize, v);
                Ok(PeerRingAction::None)
            }
            PeerRingAction::RemoteAction(next, RemoteAction::FindSuccessor(target)) => Ok(
                PeerRingAction::RemoteAction(next, RemoteAction::FindSuccessorForFix(target)),
            ),
            PeerRingAction::None => Ok(PeerRingAction::None),
            act => {
                tracing::error!("Invalid PeerRing Action");
                Err(Error::PeerRingUnexpectedAction(act))
            }
        }
    }
}

impl CorrectChord<PeerRingAction> for PeerRing {
    /// The node asks its first successor for predecessor and successor list.
    /// When it has no successor but knows a predecessor, the predecessor closes the ring.
    fn pre_stabilize(&self) -> Result<PeerRingAction> {
        let successors = self.successors();
        if successors.is_empty()? {
            let pred = self.lock_predecessor()?.clone();
            match pred {
                Some(p) => {
                    successors.update(p.clone())?;
                    self.lock_finger()?.join(&p);
                }
                None => return Ok(PeerRingAction::None),
            }
        }
        let actions = successors
            .list()?
            .into_iter()
            .map(|s| PeerRingAction::RemoteAction(s, RemoteAction::QueryForSuccessorListAndPred))
            .collect::<Vec<_>>();
        Ok(actions.into())
    }

    /// `head` is the first successor that answered, `info` its topology.
    /// Rebuild the successor list from head, adopt head's predecessor if it lies between
    /// self and head, then notify the resulting successor.
    fn stabilize(&self, head: NodeRef, info: TopoInfo) -> Result<PeerRingAction> {
        let successors = self.successors();
        let previous = successors.list()?;
        let mut new_succ = head.clone();

        if let Some(p) = info.predecessor {
            if self.space.in_range(p.id, self.local.id, head.id) {
                new_succ = p;
            }
        }

        let tail = info
            .successors
            .into_iter()
            .filter(|n| !self.is_dead(n.id))
            .collect::<Vec<_>>();
        successors.rebuild(head.clone(), &tail)?;
        // Peers skipped for one failed rpc stay until they are evicted.
        for s in previous {
            if self.space.in_range(s.id, self.local.id, head.id)
                && s.id != new_succ.id
                && !self.is_dead(s.id)
            {
                successors.update(s)?;
            }
        }
        {
            let mut finger = self.lock_finger()?;
            finger.join(&head);
            if new_succ.id != head.id {
                successors.update(new_succ.clone())?;
                finger.join(&new_succ);
            }
        }
        self.confirm_successor();

        Ok(PeerRingAction::RemoteAction(
            new_succ,
            RemoteAction::Notify(self.local.clone()),
        ))
    }

    fn check_predecessor(&self) -> Result<PeerRingAction> {
        match &*self.lock_predecessor()? {
            Some(p) => Ok(PeerRingAction::RemoteAction(
                p.clone(),
                RemoteAction::CheckPredecessor,
            )),
            None => Ok(PeerRingAction::None),
        }
    }

    fn topo_info(&self) -> Result<TopoInfo> {
        self.try_into()
    }
}
