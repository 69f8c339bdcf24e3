//! ChordKV: a self-organizing Chord ring carrying a replicated key-value store.
//! --------------
//! - [Chord](crate::dht::PeerRing) keeps identity, predecessor, successor list and finger table
//!   of a ring member. Its methods never talk to the network, they return a
//!   [PeerRingAction](crate::dht::PeerRingAction) describing what must be done remotely.
//! - [Stabilizer](crate::dht::Stabilizer) is the periodic driver running stabilize,
//!   check-predecessor and fix-fingers against the ring.
//! - [Replicator](crate::replication::Replicator) keeps every key on up to R nodes.
//! - [Elector](crate::election::Elector) derives the ring coordinator (minimum id).
//! - [Discoverer](crate::discovery::Discoverer) finds a bootstrap peer through a rendezvous name.
//! - [Swarm](crate::swarm::Swarm) glues the above with a [Transport](crate::transport::Transport)
//!   and serves the inbound [Message](crate::message::Message)s.
//!
//! # Joining a ring
//!
//! 1. The node asks its [Discoverer](crate::discovery::Discoverer) for candidates and pings them in order.
//!    The ping answer carries the real identity of the peer.
//! 2. The first live peer is asked to `find_successor(self.id)`; the answer becomes `successor_list[0]`.
//! 3. Stabilization ticks fix the predecessor of both sides via `notify`; once the node has a
//!    predecessor and a confirmed successor it turns `Active`.
//!
//! If no candidate is discovered, the node forms a singleton ring.
//!
//! # Locking
//!
//! Routing state is guarded by `std::sync` locks that are never held across an `.await`.
//! Every remote step is: lock, compute the next action, unlock, perform RPC, lock again to apply.

pub mod consts;
pub mod dht;
pub mod discovery;
pub mod election;
pub mod error;
pub mod inspect;
pub mod message;
pub mod replication;
pub mod storage;
pub mod swarm;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;

pub use async_trait::async_trait;
