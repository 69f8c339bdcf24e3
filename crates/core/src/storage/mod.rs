//! Module of MemStorage and PersistenceStorage, plus the versioned view the ring serves from.

pub mod entry;
pub mod memory;
#[cfg(feature = "sled")]
pub mod sled;

use async_trait::async_trait;

use crate::error::Result;
pub use crate::storage::entry::Entry;
pub use crate::storage::entry::EntryStorage;
pub use crate::storage::entry::VersionedStore;
pub use crate::storage::memory::MemStorage;
#[cfg(feature = "sled")]
pub use crate::storage::sled::SledStorage;

/// Key value storage interface
#[async_trait]
pub trait KvStorageInterface<V> {
    /// Get a cache entry by `key`.
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Put `entry` in the cache under `key`.
    async fn put(&self, key: &str, value: &V) -> Result<()>;

    /// Dump every pair.
    async fn get_all(&self) -> Result<Vec<(String, V)>>;

    /// Remove an `entry` by `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete all values.
    async fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    async fn count(&self) -> Result<u32>;
}
