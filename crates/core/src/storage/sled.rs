#![warn(missing_docs)]

//! Persistence Storage for default, use `sled` as backend db.

use async_trait::async_trait;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::storage::KvStorageInterface;

/// Key value pairs kept on disk, values encoded with bincode.
pub struct SledStorage {
    db: sled::Db,
    cap: u64,
    path: String,
}

impl SledStorage {
    /// New SledStorage
    /// * cap: cache capacity in bytes
    /// * path: db file location
    pub fn new_with_cap_and_path<P>(cap: u64, path: P) -> Result<Self>
    where P: AsRef<std::path::Path> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .mode(sled::Mode::HighThroughput)
            .cache_capacity(cap)
            .open()
            .map_err(Error::SledError)?;
        Ok(Self {
            db,
            cap,
            path: path.as_ref().to_string_lossy().to_string(),
        })
    }

    /// Temporary db removed on drop.
    pub fn new_temporary(cap: u64) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .cache_capacity(cap)
            .open()
            .map_err(Error::SledError)?;
        Ok(Self {
            db,
            cap,
            path: "<temporary>".to_string(),
        })
    }

    /// Flush dirty pages to disk.
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(Error::SledError)?;
        Ok(())
    }
}

#[async_trait]
impl<V> KvStorageInterface<V> for SledStorage
where V: Serialize + DeserializeOwned + Sync
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        let v = self.db.get(key).map_err(Error::SledError)?;
        if let Some(v) = v {
            return bincode::deserialize(v.as_ref())
                .map_err(Error::BincodeDeserialize)
                .map(Some);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &V) -> Result<()> {
        let data = bincode::serialize(&value).map_err(Error::BincodeSerialize)?;
        tracing::debug!("Try inserting key: {:?}", key);
        self.db.insert(key, data).map_err(Error::SledError)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<(String, V)>> {
        let iter = self.db.iter();
        Ok(iter
            .flatten()
            .flat_map(|(k, v)| {
                Some((
                    std::str::from_utf8(k.as_ref()).ok()?.to_string(),
                    bincode::deserialize(v.as_ref()).ok()?,
                ))
            })
            .collect_vec())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key.as_bytes()).map_err(Error::SledError)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.db.clear().map_err(Error::SledError)?;
        Ok(())
    }

    async fn count(&self) -> Result<u32> {
        Ok(self.db.len() as u32)
    }
}

impl std::fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStorage")
            .field("cap", &self.cap)
            .field("path", &self.path)
            .finish()
    }
}
