//! Successor for PeerRing
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;

use crate::dht::id::BiasId;
use crate::dht::id::SortRing;
use crate::dht::NodeRef;
use crate::dht::RingId;
use crate::dht::RingSpace;
use crate::error::Error;
use crate::error::Result;

/// A sequence of successors for a node on the ring.
/// It's necessary to have multiple successors to prevent a single point of failure.
/// Note the successors are in order of a clockwise distance from the node.
/// See also [super::id::BiasId].
#[derive(Debug, Clone)]
pub struct SuccessorSeq {
    /// Local node
    local: NodeRef,
    space: RingSpace,
    /// Max successor num
    max: u8,
    /// Successors
    successors: Arc<RwLock<Vec<NodeRef>>>,
}

/// Read only view of successors.
pub trait SuccessorReader {
    /// no successor known
    fn is_empty(&self) -> Result<bool>;
    /// the list reached its capacity
    fn is_full(&self) -> Result<bool>;
    /// `successor_list[index]`
    fn get(&self, index: usize) -> Result<Option<NodeRef>>;
    /// length of list
    fn len(&self) -> Result<usize>;
    /// Immediate successor, the local node itself when the list is empty.
    fn min(&self) -> Result<NodeRef>;
    /// Farthest successor, the local node itself when the list is empty.
    fn max(&self) -> Result<NodeRef>;
    /// Copy of the list.
    fn list(&self) -> Result<Vec<NodeRef>>;
    /// Membership by id.
    fn contains(&self, id: RingId) -> Result<bool>;
}

/// Mutations of successors, every write keeps the list sorted and bounded.
pub trait SuccessorWriter {
    /// Insert a successor, returns it when it made its way into the list.
    fn update(&self, successor: NodeRef) -> Result<Option<NodeRef>>;
    /// Drop a successor.
    fn remove(&self, id: RingId) -> Result<()>;
    /// Replace the whole list with `head` followed by `tail`, then sort, dedup, drop self
    /// and truncate. `head` is kept even if `tail` is empty.
    fn rebuild(&self, head: NodeRef, tail: &[NodeRef]) -> Result<Vec<NodeRef>>;
}

impl SuccessorSeq {
    /// Create an empty sequence of capacity `max`.
    pub fn new(local: NodeRef, space: RingSpace, max: u8) -> Self {
        Self {
            local,
            space,
            max,
            successors: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Read guard of the list.
    pub fn successors(&self) -> Result<RwLockReadGuard<Vec<NodeRef>>> {
        self.successors
            .read()
            .map_err(|_| Error::FailedToReadSuccessors)
    }

    /// Capacity of the list.
    pub fn capacity(&self) -> u8 {
        self.max
    }

    /// Calculate bias of the id on the ring.
    pub fn bias(&self, id: RingId) -> BiasId {
        self.space.bias(self.local.id, id)
    }

    fn normalize(&self, succs: &mut Vec<NodeRef>) {
        let local = self.local.id;
        succs.retain(|n| n.id != local);
        succs.sort_ring(self.space, local);
        succs.dedup();
        succs.truncate(self.max.into());
    }
}

impl SuccessorReader for SuccessorSeq {
    fn contains(&self, id: RingId) -> Result<bool> {
        let succs = self.successors()?;
        Ok(succs.iter().any(|n| n.id == id))
    }

    fn is_empty(&self) -> Result<bool> {
        let succs = self.successors()?;
        Ok(succs.is_empty())
    }

    fn is_full(&self) -> Result<bool> {
        let succs = self.successors()?;
        Ok(succs.len() >= self.max as usize)
    }

    fn get(&self, index: usize) -> Result<Option<NodeRef>> {
        let succs = self.successors()?;
        Ok(succs.get(index).cloned())
    }

    fn len(&self) -> Result<usize> {
        let succs = self.successors()?;
        Ok(succs.len())
    }

    fn min(&self) -> Result<NodeRef> {
        let succs = self.successors()?;
        Ok(succs.first().cloned().unwrap_or_else(|| self.local.clone()))
    }

    fn max(&self) -> Result<NodeRef> {
        let succs = self.successors()?;
        Ok(succs.last().cloned().unwrap_or_else(|| self.local.clone()))
    }

    fn list(&self) -> Result<Vec<NodeRef>> {
        let succs = self.successors()?;
        Ok(succs.clone())
    }
}

impl SuccessorWriter for SuccessorSeq {
    fn update(&self, successor: NodeRef) -> Result<Option<NodeRef>> {
        // if successor in successor list
        // or successor is self
        // or list is full and successor is farther than successor.max()
        if self.contains(successor.id)? || successor.id == self.local.id {
            return Ok(None);
        }

        if self.is_full()? && self.bias(successor.id) >= self.bias(self.max()?.id) {
            return Ok(None);
        }

        let mut succs = self
            .successors
            .write()
            .map_err(|_| Error::FailedToWriteSuccessors)?;

        succs.push(successor.clone());
        self.normalize(&mut succs);
        if succs.contains(&successor) {
            Ok(Some(successor))
        } else {
            Ok(None)
        }
    }

    fn remove(&self, id: RingId) -> Result<()> {
        let mut succs = self
            .successors
            .write()
            .map_err(|_| Error::FailedToWriteSuccessors)?;
        succs.retain(|v| v.id != id);
        Ok(())
    }

    fn rebuild(&self, head: NodeRef, tail: &[NodeRef]) -> Result<Vec<NodeRef>> {
        let mut fresh = Vec::with_capacity(tail.len() + 1);
        fresh.push(head);
        fresh.extend_from_slice(tail);
        self.normalize(&mut fresh);

        let mut succs = self
            .successors
            .write()
            .map_err(|_| Error::FailedToWriteSuccessors)?;
        *succs = fresh.clone();
        Ok(fresh)
    }
}
