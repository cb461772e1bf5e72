// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Cache service object
//!
//! A [`CacheManager`] is built once at process startup from a
//! [`CacheConfig`], shared by reference with whatever needs caching, and torn
//! down with [`CacheManager::shutdown`]. Its operations never return errors:
//! any internal failure is reported on the event channel and the caller sees
//! a miss or a rejected write.

use log::{debug, error, info};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::cache_config::CacheConfig;
use super::compression::CompressionCodec;
use super::entry::CachedValue;
use super::events::{CacheEvent, CacheStats, EventBus, StatsCounters};
use super::instrumentation::InstrumentedCache;
use super::persistent_tier::PersistentTier;
use super::store::CacheStore;
use super::sweeper::SweeperHandle;
use crate::error::CacheResult;
use crate::storage::{create_storage_driver, BoxedStorageDriver, StorageDriver};

/// Name of the storage tree holding cache records
const ENTRIES_TREE: &str = "entries";

/// Two-tier cache with tag revalidation and fail-open operations
pub struct CacheManager {
    config: CacheConfig,
    driver: Mutex<Option<BoxedStorageDriver>>,
    store: Arc<CacheStore>,
    cache: InstrumentedCache,
    events: Arc<EventBus>,
    stats: Arc<StatsCounters>,
    sweeper: Mutex<Option<SweeperHandle>>,
    shut_down: AtomicBool,
}

impl CacheManager {
    /// Open the cache described by `config`.
    ///
    /// Unlike the operations, construction fails loudly: a bad configuration
    /// or an unopenable storage directory is returned as an error.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let driver = create_storage_driver(config.storage_type, &config.cache_directory_path)?;
        Self::with_driver(config, driver)
    }

    /// Open the cache over an already constructed storage driver
    pub fn with_driver(config: CacheConfig, driver: BoxedStorageDriver) -> CacheResult<Self> {
        config.validate()?;

        let tree = driver.open_tree(ENTRIES_TREE)?;
        let codec = CompressionCodec::new(config.compress);
        let persistent = PersistentTier::new(tree, codec, config.sync_writes);

        let events = Arc::new(EventBus::new(config.event_channel_capacity));
        let stats = Arc::new(StatsCounters::default());
        let store = Arc::new(CacheStore::open(
            &config,
            persistent,
            Arc::clone(&events),
            Arc::clone(&stats),
        )?);
        let cache = InstrumentedCache::new(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&stats),
            config.slow_threshold(),
        );

        info!(
            "cache opened: backend={}, path={}, budget={} bytes, compress={}",
            driver.storage_type(),
            config.cache_directory_path.display(),
            config.max_memory_bytes,
            config.compress
        );

        Ok(Self {
            config,
            driver: Mutex::new(Some(driver)),
            store,
            cache,
            events,
            stats,
            sweeper: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Value for `key`, or `None` on a miss
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        if self.is_shut_down() {
            return None;
        }
        self.cache.get(key)
    }

    /// Store `value` under `key` with no tags.
    /// `ttl` of `None` applies the configured default.
    pub fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>) -> bool {
        self.set_with_tags(key, value, ttl, Vec::<String>::new())
    }

    /// Store `value` under `key`, replacing its previous value, expiry and tags
    pub fn set_with_tags<I, S>(
        &self,
        key: &str,
        value: CachedValue,
        ttl: Option<Duration>,
        tags: I,
    ) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_shut_down() {
            return false;
        }
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        self.cache.set(key, value, ttl, &tags)
    }

    /// Invalidate every entry tagged `tag`.
    /// Returns `true` even when nothing carried the tag.
    pub fn revalidate_tag(&self, tag: &str) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.cache.revalidate_tag(tag)
    }

    /// Remove `key` from both tiers; `true` if it was present
    pub fn delete(&self, key: &str) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.cache.delete(key)
    }

    /// Typed read. A payload stored under a different type tag is a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str, value_type: &str) -> Option<T> {
        let value = self.get(key)?;
        match value.decode_json(value_type) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                debug!("treating '{}' as a miss: {}", key, err);
                None
            }
        }
    }

    /// Typed write
    pub fn set_json<T, I, S>(
        &self,
        key: &str,
        value_type: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: I,
    ) -> bool
    where
        T: Serialize,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match CachedValue::json(value_type, value) {
            Ok(value) => self.set_with_tags(key, value, ttl, tags),
            Err(err) => {
                error!("cannot encode value for '{}': {}", key, err);
                false
            }
        }
    }

    /// Purge expired entries now; returns how many were removed
    pub fn sweep(&self) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        self.cache.sweep()
    }

    /// Start the periodic sweeper on the current tokio runtime.
    ///
    /// Returns `false` if the sweeper is disabled by configuration, already
    /// running, the cache is shut down, or no runtime is available.
    pub fn spawn_sweeper(&self) -> bool {
        let Some(period) = self.config.sweep_interval() else {
            return false;
        };
        if self.is_shut_down() {
            return false;
        }

        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return false;
        }
        *sweeper = SweeperHandle::spawn(self.cache.clone(), period);
        sweeper.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Drop every entry from both tiers and the tag index.
    /// Not atomic with respect to writers running at the same time.
    pub fn clear(&self) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.cache.clear()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Whether `key` currently sits in the memory tier
    pub fn is_resident(&self, key: &str) -> bool {
        self.store.is_resident(key)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the sweeper, then flush and release every storage handle so the
    /// cache directory can be reopened while this value is still alive.
    /// Later calls are no-ops; operations after shutdown miss or reject.
    pub fn shutdown(&self) -> CacheResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("shutting down cache");
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }

        let closed = self.store.close();
        if let Some(mut driver) = self.driver.lock().take() {
            driver.shutdown()?;
        }
        closed?;
        info!("cache shut down");
        Ok(())
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("error while shutting down cache: {}", err);
        }
    }
}
