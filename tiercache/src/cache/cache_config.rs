// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Cache configuration and policies

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CacheError, CacheResult};
use crate::storage::StorageType;

/// Cache configuration
///
/// Every field has a default, so a JSON file only needs the options it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory-tier eviction threshold (bytes)
    pub max_memory_bytes: usize,

    /// Root of the persistent tier
    pub cache_directory_path: PathBuf,

    /// Compress records before they reach the persistent tier
    pub compress: bool,

    /// Default TTL when callers omit one
    pub default_revalidate_seconds: u64,

    /// Operations slower than this emit a slow-operation warning
    pub slow_operation_threshold_ms: u64,

    /// Backend for the persistent tier
    pub storage_type: StorageType,

    /// Flush the storage driver on every write-through
    pub sync_writes: bool,

    /// Background sweep period; 0 disables the sweeper
    pub sweep_interval_secs: u64,

    /// Number of per-key lock stripes
    pub lock_stripes: usize,

    /// Buffered events per subscriber before it starts lagging
    pub event_channel_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 50 * 1024 * 1024, // 50MB
            cache_directory_path: PathBuf::from(".tiercache"),
            compress: false,
            default_revalidate_seconds: 300, // 5 minutes
            slow_operation_threshold_ms: 10,
            storage_type: StorageType::Sled,
            sync_writes: true,
            sweep_interval_secs: 60,
            lock_stripes: 64,
            event_channel_capacity: 1024,
        }
    }
}

impl CacheConfig {
    /// Configuration backed by a directory on disk
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory_path: path.into(),
            ..Self::default()
        }
    }

    /// Configuration for tests and request-local caches: memory driver, no sweeper
    pub fn in_memory() -> Self {
        Self {
            storage_type: StorageType::Memory,
            sweep_interval_secs: 0,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CacheError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            CacheError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn with_default_revalidate_seconds(mut self, seconds: u64) -> Self {
        self.default_revalidate_seconds = seconds;
        self
    }

    pub fn with_slow_operation_threshold_ms(mut self, millis: u64) -> Self {
        self.slow_operation_threshold_ms = millis;
        self
    }

    pub fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn with_sweep_interval_secs(mut self, seconds: u64) -> Self {
        self.sweep_interval_secs = seconds;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// TTL applied when a caller passes none
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_revalidate_seconds)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_operation_threshold_ms)
    }

    /// `None` when the sweeper is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Validate the configuration
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_memory_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_memory_bytes must be > 0".to_string(),
            ));
        }

        if self.lock_stripes == 0 {
            return Err(CacheError::InvalidConfig(
                "lock_stripes must be > 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }

        if self.storage_type == StorageType::Sled
            && self.cache_directory_path.as_os_str().is_empty()
        {
            return Err(CacheError::InvalidConfig(
                "cache_directory_path is required for the sled backend".to_string(),
            ));
        }

        Ok(())
    }
}
