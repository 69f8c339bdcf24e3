//! Versioned values and the last-writer-wins store built on a [KvStorageInterface] backend.
//!
//! Deletes are recorded as tombstones so they replicate like writes. Every write carries a
//! version, the wall clock in milliseconds bumped above the previous version of that key.
//! Two replicas holding different entries for one key converge by [Entry::supersedes].
use futures::lock::Mutex;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::RingId;
use crate::dht::RingSpace;
use crate::error::Result;
use crate::storage::KvStorageInterface;
use crate::utils::get_epoch_ms;

/// A stored value with its version, `value: None` is a tombstone.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entry {
    /// Payload, absent if the key was deleted.
    pub value: Option<Vec<u8>>,
    /// Monotonic per key.
    pub version: u64,
}

impl Entry {
    /// Create an entry.
    pub fn new(value: Option<Vec<u8>>, version: u64) -> Self {
        Self { value, version }
    }

    /// Deletion marker.
    pub fn tombstone(version: u64) -> Self {
        Self {
            value: None,
            version,
        }
    }

    /// Whether the entry is a deletion marker.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Merge rule between an incoming entry (`self`) and the local one.
    /// Higher version wins; on a tie a value beats a tombstone; otherwise local stays.
    pub fn supersedes(&self, local: &Entry) -> bool {
        if self.version != local.version {
            return self.version > local.version;
        }
        !self.is_tombstone() && local.is_tombstone()
    }
}

/// Backend accepted by [VersionedStore].
pub type EntryStorage = Box<dyn KvStorageInterface<Entry> + Send + Sync>;

/// The local key value store of a ring member.
/// Writes are serialized so versions of a key never go backward.
pub struct VersionedStore {
    space: RingSpace,
    backend: EntryStorage,
    write_lock: Mutex<()>,
}

impl VersionedStore {
    /// Wrap a backend.
    pub fn new(space: RingSpace, backend: EntryStorage) -> Self {
        Self {
            space,
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Position of a key on the ring.
    pub fn key_id(&self, key: &str) -> RingId {
        self.space.hash(key)
    }

    /// Raw entry, tombstones included.
    pub async fn entry(&self, key: &str) -> Result<Option<Entry>> {
        self.backend.get(key).await
    }

    /// Live value of a key.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.backend.get(key).await?.and_then(|e| e.value))
    }

    async fn write(&self, key: &str, value: Option<Vec<u8>>) -> Result<(Option<Entry>, Entry)> {
        let _guard = self.write_lock.lock().await;
        let prev = self.backend.get(key).await?;
        let floor = prev.as_ref().map(|e| e.version + 1).unwrap_or(0);
        let entry = Entry::new(value, get_epoch_ms().max(floor));
        self.backend.put(key, &entry).await?;
        Ok((prev, entry))
    }

    /// Write a value with a fresh version.
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<Entry> {
        let (_, entry) = self.write(key, Some(value)).await?;
        Ok(entry)
    }

    /// Write a tombstone. Returns whether a live value was removed, and the tombstone.
    pub async fn delete(&self, key: &str) -> Result<(bool, Entry)> {
        let (prev, entry) = self.write(key, None).await?;
        let removed = prev.map(|e| !e.is_tombstone()).unwrap_or(false);
        Ok((removed, entry))
    }

    /// LWW merge of a remote entry. Returns `true` if the local state changed.
    /// Applying the same entry twice changes nothing the second time.
    pub async fn apply(&self, key: &str, entry: Entry) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let accept = match self.backend.get(key).await? {
            Some(local) => entry.supersedes(&local),
            None => true,
        };
        if accept {
            self.backend.put(key, &entry).await?;
        }
        Ok(accept)
    }

    /// Merge a batch, returns how many entries were accepted.
    pub async fn apply_all(&self, entries: Vec<(String, Entry)>) -> Result<usize> {
        let mut n = 0;
        for (key, entry) in entries {
            if self.apply(&key, entry).await? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Every entry, tombstones included.
    pub async fn entries(&self) -> Result<Vec<(String, Entry)>> {
        self.backend.get_all().await
    }

    /// Entries whose key hashes into `(start, end]`.
    pub async fn range(&self, start: RingId, end: RingId) -> Result<Vec<(String, Entry)>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|(k, _)| self.space.in_range_incl(self.key_id(k), start, end))
            .collect())
    }

    /// Drop a key locally without leaving a tombstone, used once a replica moved away.
    pub async fn purge(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.remove(key).await
    }

    /// `(live values, tombstones)`
    pub async fn counts(&self) -> Result<(usize, usize)> {
        let all = self.entries().await?;
        let tombstones = all.iter().filter(|(_, e)| e.is_tombstone()).count();
        Ok((all.len() - tombstones, tombstones))
    }
}
