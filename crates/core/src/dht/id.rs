#![warn(missing_docs)]

//! This module defines identity on the ring.
//!
//! A [RingId] is an element of the finite ring Z/2^M, where M is the ring width in bits
//! kept by [RingSpace]. Ids are produced by hashing a stable name (hostname of a node, or
//! the application key of a value) with SHA-1 and reducing modulo 2^M.
//!
//! There is no meaningful total order on a ring, only a clockwise distance:
//! `distance(a, b) = (b - a) mod 2^M`. To compare two ids we pick a reference id and
//! compare their distances from it, that's what [BiasId] does.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::MAX_RING_BITS;
use crate::error::Error;
use crate::error::Result;

/// RingId is an unsigned integer in [0, 2^M).
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Serialize, Deserialize, Hash)]
pub struct RingId(u64);

impl fmt::Display for RingId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RingId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<RingId> for u64 {
    fn from(id: RingId) -> u64 {
        id.0
    }
}

impl RingId {
    /// Raw value of id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// The identifier space, a ring of 2^bits elements.
/// All arithmetic on [RingId] goes through it so ids never escape [0, 2^M).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct RingSpace {
    bits: u8,
}

impl RingSpace {
    /// Create a ring of 2^bits ids, bits must be within 1..=64.
    pub fn new(bits: u8) -> Result<Self> {
        if bits == 0 || bits > MAX_RING_BITS {
            return Err(Error::InvalidRingBits(bits));
        }
        Ok(Self { bits })
    }

    /// Ring width M.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    fn mask(&self) -> u64 {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Reduce a raw value into the ring.
    pub fn id(&self, v: u64) -> RingId {
        RingId(v & self.mask())
    }

    /// Hash a name to the ring: `sha1(name) mod 2^M`.
    /// The low 64 bits of the digest are the low 64 bits of the digest as an integer,
    /// so masking them equals reducing the whole digest.
    pub fn hash(&self, name: &str) -> RingId {
        let mut hasher = Sha1::new();
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[digest.len() - 8..]);
        self.id(u64::from_be_bytes(low))
    }

    /// Clockwise distance from `a` to `b`.
    pub fn distance(&self, a: RingId, b: RingId) -> u64 {
        b.0.wrapping_sub(a.0) & self.mask()
    }

    /// `id + offset mod 2^M`
    pub fn add(&self, id: RingId, offset: u64) -> RingId {
        self.id(id.0.wrapping_add(offset))
    }

    /// Start of the i-th finger of `id`: `(id + 2^i) mod 2^M`.
    pub fn finger_start(&self, id: RingId, i: u8) -> RingId {
        debug_assert!(i < self.bits);
        self.add(id, 1u64 << i)
    }

    /// Test x <- (a, b).
    /// When `a == b` the interval covers the whole ring except `a`.
    pub fn in_range(&self, x: RingId, a: RingId, b: RingId) -> bool {
        let dx = self.distance(a, x);
        if a == b {
            return dx != 0;
        }
        dx > 0 && dx < self.distance(a, b)
    }

    /// Test x <- (a, b].
    /// When `a == b` the interval covers the whole ring.
    pub fn in_range_incl(&self, x: RingId, a: RingId, b: RingId) -> bool {
        if a == b {
            return true;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx <= self.distance(a, b)
    }

    /// Wrap `id` into a [BiasId] observed from `bias`.
    pub fn bias(&self, bias: RingId, id: RingId) -> BiasId {
        BiasId {
            bias,
            pos: self.distance(bias, id),
        }
    }
}

/// Bias Id is an id observed from a fixed point on the ring.
/// The `bias` is treated as zero, so ids can be ordered by their clockwise distance
/// from it. Only BiasIds with the same bias are comparable.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct BiasId {
    bias: RingId,
    pos: u64,
}

impl BiasId {
    /// Clockwise distance from the bias.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// The zero point.
    pub fn bias(&self) -> RingId {
        self.bias
    }
}

impl PartialOrd for BiasId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BiasId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        debug_assert_eq!(self.bias, other.bias, "compare BiasId with different bias");
        self.pos.cmp(&other.pos)
    }
}

/// NodeRef identifies a ring member for routing purposes.
/// Two refs are the same member if their ids are equal, the address is only how to reach it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRef {
    /// Position on the ring.
    pub id: RingId,
    /// `host:port` of the member's rpc endpoint.
    pub address: String,
}

impl NodeRef {
    /// Create a NodeRef.
    pub fn new(id: RingId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Ordering with a reference id.
/// This trait defines necessary method for sorting by clockwise distance.
pub trait SortRing {
    /// Sort by clockwise distance from `origin`.
    fn sort_ring(&mut self, space: RingSpace, origin: RingId);
}

impl SortRing for Vec<NodeRef> {
    fn sort_ring(&mut self, space: RingSpace, origin: RingId) {
        self.sort_by_key(|n| space.distance(origin, n.id));
    }
}

impl SortRing for Vec<RingId> {
    fn sort_ring(&mut self, space: RingSpace, origin: RingId) {
        self.sort_by_key(|id| space.distance(origin, *id));
    }
}
