//! DHT types about `PeerRing`.
#![warn(missing_docs)]
use super::chord::TopoInfo;
use super::NodeRef;
use super::RingId;
use crate::error::Result;

/// Chord is a distributed hash table (DHT) algorithm that is designed to efficiently
/// distribute data across peer-to-peer network nodes. You may want to browse its
/// [wiki](https://en.wikipedia.org/wiki/Chord_(peer-to-peer)) before you read this.
///
/// Every member and every key is placed on the ring by its [RingId]. A key is stored
/// on its successor, the first member clockwise from it. Each member keeps a finger
/// table, so `find_successor` takes O(log n) hops without global knowledge.
///
/// Some methods return an `Action` which is used to tell outer the extra action to take
/// after handling data inside the struct. It's useful since the struct may not work
/// for managing whole data but for giving strategies by data inside.
pub trait Chord<Action> {
    /// Join a DHT containing node `bootstrap`.
    fn join(&self, bootstrap: NodeRef) -> Result<Action>;

    /// Ask DHT for the successor of id.
    /// May return a remote action for the successor is recorded in another node.
    fn find_successor(&self, id: RingId) -> Result<Action>;

    /// Notify the DHT that a node is its predecessor.
    /// This method should return the predecessor after updating.
    fn notify(&self, candidate: NodeRef) -> Result<NodeRef>;

    /// Fix finger table by finding the successor for each finger.
    /// According to the paper, this method should be called periodically.
    /// According to the paper, only one finger should be fixed at a time.
    fn fix_fingers(&self) -> Result<Action>;
}

/// Ring maintenance, the periodic half of the protocol.
///
/// Chord's correctness rests on successors and predecessors only, fingers are an
/// optimization built from them. This trait holds the operations a stabilization
/// tick runs.
pub trait CorrectChord<Action>: Chord<Action> {
    /// Steps before Stabilize Operation.
    /// The node queries its successors for predecessor and successor list, the driver
    /// stops at the first one that answers.
    fn pre_stabilize(&self) -> Result<Action>;

    /// Stabilize operation.
    ///
    /// The node rebuilds its successor list from the answering successor `head`. It then
    /// checks whether head's predecessor is an improved successor and adopts it. Whether
    /// or not there is an improved successor, the node notifies its successor of its own
    /// identity.
    fn stabilize(&self, head: NodeRef, info: TopoInfo) -> Result<Action>;

    /// Ask the driver to ping predecessor.
    fn check_predecessor(&self) -> Result<Action>;

    /// A helper function to get the topological
    /// info about the chord.
    fn topo_info(&self) -> Result<TopoInfo>;
}
