#![warn(missing_docs)]
use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeRef;
use crate::dht::RingId;
use crate::dht::RingSpace;

/// Finger table of Chord DHT.
/// Entry `i` caches the successor of `(id + 2^i) mod 2^M`, so its clockwise distance from
/// `id` is at least `2^i` once converged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FingerTable {
    id: RingId,
    space: RingSpace,
    finger: Vec<Option<NodeRef>>,
    fix_finger_index: u8,
}

impl PartialEq for FingerTable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.finger == other.finger
    }
}

impl FingerTable {
    /// builder, the table has one slot for every bit of the ring.
    pub fn new(id: RingId, space: RingSpace) -> Self {
        Self {
            id,
            space,
            finger: vec![None; space.bits() as usize],
            fix_finger_index: 0,
        }
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, equals M.
    pub fn size(&self) -> usize {
        self.finger.len()
    }

    /// Get first element from Finger Table
    pub fn first(&self) -> Option<NodeRef> {
        self.finger.iter().flatten().next().cloned()
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<NodeRef> {
        self.finger.get(index).cloned().flatten()
    }

    /// setter
    pub fn set(&mut self, index: usize, node: NodeRef) {
        tracing::debug!("set finger table index: {} node: {}", index, node);
        if index >= self.finger.len() {
            tracing::error!("set finger index out of range, index: {}", index);
            return;
        }
        if node.id == self.id {
            tracing::debug!("set finger table with self id, ignore it");
            return;
        }
        self.finger[index] = Some(node);
    }

    /// setter for fix_finger_index
    pub fn set_fix(&mut self, node: NodeRef) {
        let index = self.fix_finger_index as usize;
        self.set(index, node)
    }

    /// Move the round-robin cursor to the next finger and return the new index.
    pub fn next_fix_index(&mut self) -> u8 {
        let size = self.finger.len().max(1);
        self.fix_finger_index = ((self.fix_finger_index as usize + 1) % size) as u8;
        self.fix_finger_index
    }

    /// remove a node from dht finger table.
    /// Slots pointing to the removed node are refilled with the entry right after
    /// its last occurrence, which is the next known node clockwise.
    pub fn remove(&mut self, id: RingId) {
        let indexes: Vec<usize> = self
            .finger
            .iter()
            .enumerate()
            .filter(|(_, x)| x.as_ref().map(|n| n.id) == Some(id))
            .map(|(idx, _)| idx)
            .collect();

        if let (Some(first_idx), Some(last_idx)) = (indexes.first(), indexes.last()) {
            let end_idx = *last_idx + 1;
            let fix = self.finger.get(end_idx).cloned().flatten();
            for idx in *first_idx..end_idx {
                if self.finger[idx].as_ref().map(|n| n.id) == Some(id) {
                    self.finger[idx] = fix.clone();
                }
            }
        }
    }

    /// Join FingerTable.
    /// `node` becomes entry `k` when it is at least `2^k` away and closer than the
    /// current entry.
    pub fn join(&mut self, node: &NodeRef) {
        if node.id == self.id {
            return;
        }
        let bias = self.space.bias(self.id, node.id);

        for k in 0..self.finger.len() {
            if bias.pos() < (1u64 << k) {
                break;
            }

            if let Some(v) = &self.finger[k] {
                if bias >= self.space.bias(self.id, v.id) {
                    continue;
                }
            }

            self.finger[k] = Some(node.clone());
        }
    }

    /// Check finger is contains some node
    pub fn contains(&self, id: RingId) -> bool {
        self.finger.iter().flatten().any(|n| n.id == id)
    }

    /// Closest preceding finger of `target`:
    /// the highest entry whose id is strictly in `(self.id, target)`.
    /// Nodes listed in `excluded` are skipped.
    pub fn closest_preceding(&self, target: RingId, excluded: &[RingId]) -> Option<NodeRef> {
        for entry in self.finger.iter().rev().flatten() {
            if excluded.contains(&entry.id) {
                continue;
            }
            if self.space.in_range(entry.id, self.id, target) {
                return Some(entry.clone());
            }
        }
        None
    }

    /// get length of finger
    pub fn len(&self) -> usize {
        self.finger.iter().flatten().count()
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Option<NodeRef>> {
        &self.finger
    }

    #[cfg(test)]
    pub fn reset_finger(&mut self) {
        self.finger = vec![None; self.finger.len()]
    }
}
