//! Error of chordkv_core

use crate::dht::RingId;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in chordkv-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Peer {0} is unreachable")]
    PeerUnreachable(RingId),

    #[error("Lookup exceeded hop budget of {0}")]
    RoutingHopBudgetExceeded(u32),

    #[error("Ring inconsistent: {0}")]
    RingInconsistent(String),

    #[error("Ring width must be within 1..=64 bits, got {0}")]
    InvalidRingBits(u8),

    #[error("Replication factor must be at least 1")]
    InvalidReplicationFactor,

    #[error("Node is leaving the ring")]
    NodeLeaving,

    #[error("DHT Lock Error")]
    DHTSyncLockError,

    #[error("Failed on read successors")]
    FailedToReadSuccessors,

    #[error("Failed on write successors")]
    FailedToWriteSuccessors,

    #[error("Unexpected PeerRingAction, {0:?}")]
    PeerRingUnexpectedAction(crate::dht::PeerRingAction),

    #[error("Unexpected response for {0}")]
    UnexpectedResponse(String),

    #[error("Remote peer returned error: {0}")]
    RemoteError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Replication queue closed")]
    ReplicationQueueClosed,

    #[error("No successor answered the pull of ({0}, {1}]")]
    PullFailed(RingId, RingId),

    #[error("JSON serialization error")]
    Serialize(#[source] serde_json::Error),

    #[error("JSON deserialization error")]
    Deserialize(#[source] serde_json::Error),

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[cfg(feature = "sled")]
    #[error("Sled error: {0}")]
    SledError(#[from] sled::Error),
}
