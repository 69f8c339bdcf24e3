#![warn(missing_docs)]
//! Implementation of the ring's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
/// Finger table for the ring
pub mod finger;
pub mod id;
mod lookup;
mod stabilization;
pub mod successor;
pub mod types;

pub use chord::NodeState;
pub use chord::PeerRing;
pub use chord::PeerRingAction;
pub use chord::RemoteAction as PeerRingRemoteAction;
pub use chord::TopoInfo;
pub use finger::FingerTable;
pub use id::BiasId;
pub use id::NodeRef;
pub use id::RingId;
pub use id::RingSpace;
pub use id::SortRing;
pub use lookup::Router;
pub use stabilization::Stabilizer;
pub use successor::SuccessorReader;
pub use successor::SuccessorWriter;
pub use types::Chord;
pub use types::CorrectChord;
