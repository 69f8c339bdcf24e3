//! Constant variables.

/// Default ring width M in bits. Ids live in [0, 2^M).
pub const DEFAULT_RING_BITS: u8 = 64;
/// Widest ring supported, ids are stored in a `u64`.
pub const MAX_RING_BITS: u8 = 64;
/// Default replication factor R, also the length of successor list.
pub const DEFAULT_REPLICATION_FACTOR: u8 = 3;
/// default rpc timeout in ms
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 2000;
/// default interval of stabilization in ms
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 2000;
/// default interval of replication pass in ms
pub const DEFAULT_REPLICATE_INTERVAL_MS: u64 = 2000;
/// default interval of coordinator check in ms
pub const DEFAULT_ELECT_INTERVAL_MS: u64 = 10000;
/// Consecutive failed rpcs before a peer is considered dead.
pub const DEAD_PEER_STRIKES: u8 = 3;
/// Replicas are resolved (handed off or purged) every N replication passes.
pub const RESOLVE_EVERY: u32 = 5;
/// Bootstrap attempts before a node gives up and forms a singleton ring.
pub const DEFAULT_BOOTSTRAP_ATTEMPTS: u32 = 3;
/// First backoff between bootstrap attempts in ms, doubled on each retry.
pub const DEFAULT_BOOTSTRAP_BACKOFF_MS: u64 = 1000;
/// Upper bound of nodes visited by a single election walk.
pub const MAX_ELECTION_HOPS: usize = 1024;
