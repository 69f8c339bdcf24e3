use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chordkv_core::consts::DEFAULT_BOOTSTRAP_ATTEMPTS;
use chordkv_core::consts::DEFAULT_BOOTSTRAP_BACKOFF_MS;
use chordkv_core::consts::DEFAULT_ELECT_INTERVAL_MS;
use chordkv_core::consts::DEFAULT_REPLICATE_INTERVAL_MS;
use chordkv_core::consts::DEFAULT_REPLICATION_FACTOR;
use chordkv_core::consts::DEFAULT_RING_BITS;
use chordkv_core::consts::DEFAULT_RPC_TIMEOUT_MS;
use chordkv_core::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use chordkv_core::consts::MAX_RING_BITS;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::processor::ProcessorConfig;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

lazy_static::lazy_static! {
  static ref DEFAULT_STORAGE_CONFIG: StorageConfig = StorageConfig::Sled {
    path: get_storage_location(".chordkv", "data"),
    capacity: DEFAULT_STORAGE_CAPACITY,
  };
}

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:10000";
pub const DEFAULT_RENDEZVOUS: &str = "chordkv_server";
pub const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:10000";
pub const DEFAULT_STORAGE_CAPACITY: u64 = 200000000;

pub fn get_storage_location<P>(prefix: P, path: P) -> String
where P: AsRef<std::path::Path> {
    let home_dir = env::var_os("HOME").map(PathBuf::from);
    let expect = match home_dir {
        Some(dir) => dir.join(prefix).join(path),
        None => std::path::Path::new("data").join(prefix).join(path),
    };
    expect.to_string_lossy().to_string()
}

fn default_hostname() -> String {
    env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_rendezvous() -> Option<String> {
    Some(env::var("NETWORK_ALIAS").unwrap_or_else(|_| DEFAULT_RENDEZVOUS.to_string()))
}

fn default_ring_bits() -> u8 {
    DEFAULT_RING_BITS
}

fn default_replication_factor() -> u8 {
    DEFAULT_REPLICATION_FACTOR
}

fn default_stabilize_interval_ms() -> u64 {
    DEFAULT_STABILIZE_INTERVAL_MS
}

fn default_replicate_interval_ms() -> u64 {
    DEFAULT_REPLICATE_INTERVAL_MS
}

fn default_elect_interval_ms() -> u64 {
    DEFAULT_ELECT_INTERVAL_MS
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_bootstrap_attempts() -> u32 {
    DEFAULT_BOOTSTRAP_ATTEMPTS
}

fn default_bootstrap_backoff_ms() -> u64 {
    DEFAULT_BOOTSTRAP_BACKOFF_MS
}

fn default_storage() -> StorageConfig {
    DEFAULT_STORAGE_CONFIG.clone()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Identity of the node, hashed onto the ring.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Address peers use to reach this node, `hostname:port` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
    /// DNS name resolving to the members of the ring.
    #[serde(default = "default_rendezvous")]
    pub rendezvous: Option<String>,
    /// Addresses tried after the rendezvous name.
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default = "default_ring_bits")]
    pub ring_bits: u8,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
    #[serde(default = "default_stabilize_interval_ms")]
    pub stabilize_interval_ms: u64,
    #[serde(default = "default_replicate_interval_ms")]
    pub replicate_interval_ms: u64,
    #[serde(default = "default_elect_interval_ms")]
    pub elect_interval_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Hops a lookup may take, ring bits + 1 when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop_budget: Option<u32>,
    #[serde(default = "default_bootstrap_attempts")]
    pub bootstrap_attempts: u32,
    #[serde(default = "default_bootstrap_backoff_ms")]
    pub bootstrap_backoff_ms: u64,
    #[serde(default = "default_storage")]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Sled { path: String, capacity: u64 },
    Memory,
}

impl StorageConfig {
    pub fn new(path: &str, capacity: u64) -> Self {
        Self::Sled {
            path: path.to_string(),
            capacity,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_hostname())
    }
}

impl Config {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            advertise_addr: None,
            rendezvous: default_rendezvous(),
            seeds: vec![],
            ring_bits: DEFAULT_RING_BITS,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
            replicate_interval_ms: DEFAULT_REPLICATE_INTERVAL_MS,
            elect_interval_ms: DEFAULT_ELECT_INTERVAL_MS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            hop_budget: None,
            bootstrap_attempts: DEFAULT_BOOTSTRAP_ATTEMPTS,
            bootstrap_backoff_ms: DEFAULT_BOOTSTRAP_BACKOFF_MS,
            storage: DEFAULT_STORAGE_CONFIG.clone(),
        }
    }

    /// Address advertised to peers.
    pub fn advertise_addr(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.hostname, self.port))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn bootstrap_backoff(&self) -> Duration {
        Duration::from_millis(self.bootstrap_backoff_ms)
    }

    /// Reject values the ring cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ring_bits == 0 || self.ring_bits > MAX_RING_BITS {
            return Err(Error::InvalidConfig(format!(
                "ring_bits must be within 1..={}, got {}",
                MAX_RING_BITS, self.ring_bits
            )));
        }
        if self.replication_factor == 0 {
            return Err(Error::InvalidConfig(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        if self.hostname.is_empty() {
            return Err(Error::InvalidConfig("hostname is empty".to_string()));
        }
        Ok(())
    }

    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self).map_err(|_| Error::EncodeError)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        serde_yaml::from_reader(f_rdr).map_err(Error::SerdeYamlError)
    }
}

impl From<&Config> for ProcessorConfig {
    fn from(config: &Config) -> Self {
        ProcessorConfig {
            stabilize_interval: Duration::from_millis(config.stabilize_interval_ms),
            replicate_interval: Duration::from_millis(config.replicate_interval_ms),
            elect_interval: Duration::from_millis(config.elect_interval_ms),
        }
    }
}
