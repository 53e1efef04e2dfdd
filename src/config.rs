//! Configuration for the read path
//!
//! TOML-backed configuration with per-field defaults and environment-free
//! construction for tests. Every knob the read path exposes lives here:
//! the cache byte budget, the store queue sizes and worker counts, and the
//! read omit timeout.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Chunk cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Store queue settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// Chunk cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum size of the chunk cache in bytes
    #[serde(default = "default_cache_max_size")]
    pub max_size_bytes: u64,
}

/// Store queue settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Capacity of the bounded read queue
    #[serde(default = "default_read_queue_size")]
    pub read_queue_size: usize,

    /// Capacity of each per-writer write queue
    #[serde(default = "default_write_queue_size")]
    pub write_queue_size: usize,

    /// Number of read workers draining the read queue
    #[serde(default = "default_num_readers")]
    pub num_readers: usize,

    /// Number of write workers; the key space is sharded across them so
    /// writes for one metric stay ordered
    #[serde(default = "default_num_writers")]
    pub num_writers: usize,

    /// Reads that waited in the queue longer than this many seconds are
    /// discarded instead of executed
    #[serde(default = "default_omit_read_timeout")]
    pub omit_read_timeout_secs: u64,

    /// Retention periods (seconds) the store keeps tables for
    #[serde(default = "default_ttls")]
    pub ttls: Vec<u32>,
}

// (1024 ^ 3) * 4 = 4294967296 = 4G
fn default_cache_max_size() -> u64 {
    4 * 1024 * 1024 * 1024
}

fn default_read_queue_size() -> usize {
    100_000
}

fn default_write_queue_size() -> usize {
    100_000
}

fn default_num_readers() -> usize {
    10
}

fn default_num_writers() -> usize {
    10
}

fn default_omit_read_timeout() -> u64 {
    60
}

fn default_ttls() -> Vec<u32> {
    // 35 days
    vec![60 * 60 * 24 * 35]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_cache_max_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            read_queue_size: default_read_queue_size(),
            write_queue_size: default_write_queue_size(),
            num_readers: default_num_readers(),
            num_writers: default_num_writers(),
            omit_read_timeout_secs: default_omit_read_timeout(),
            ttls: default_ttls(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cache.max_size_bytes == 0 {
            return Err(Error::Configuration(
                "cache.max_size_bytes must be greater than 0".into(),
            ));
        }
        if self.store.num_readers == 0 || self.store.num_writers == 0 {
            return Err(Error::Configuration(
                "store.num_readers and store.num_writers must be greater than 0".into(),
            ));
        }
        if self.store.read_queue_size == 0 || self.store.write_queue_size == 0 {
            return Err(Error::Configuration(
                "store queue sizes must be greater than 0".into(),
            ));
        }
        if self.store.ttls.is_empty() {
            return Err(Error::Configuration(
                "store.ttls must name at least one retention period".into(),
            ));
        }
        Ok(())
    }
}
