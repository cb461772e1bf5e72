// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Shared helpers for cache integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tiercache::storage::persistent::{MemoryStorageDriver, StorageIter, StorageResult};
use tiercache::storage::{StorageDriver, StorageDriverError, StorageTree, StorageType};
use tiercache::{CacheConfig, CacheEntry, CacheEvent, CacheManager, CachedValue};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// A sled-backed cache in its own temporary directory
pub struct CacheFixture {
    pub dir: TempDir,
    pub cache: CacheManager,
}

impl CacheFixture {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Build with a tweaked configuration; the path is filled in here
    pub fn with_config(tweak: impl FnOnce(CacheConfig) -> CacheConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = tweak(CacheConfig::at_path(dir.path().join("cache")).with_sweep_interval_secs(0));
        let cache = CacheManager::new(config).expect("Failed to open cache");
        Self { dir, cache }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Shut the cache down and open a fresh instance over the same directory
    pub fn reopen(self) -> Self {
        let Self { dir, cache } = self;
        let config = cache.config().clone();
        cache.shutdown().expect("Failed to shut down cache");
        drop(cache);
        let cache = CacheManager::new(config).expect("Failed to reopen cache");
        Self { dir, cache }
    }
}

/// Failure modes a [`FaultyDriver`] can be switched into at runtime
#[derive(Debug, Default)]
pub struct FaultSwitches {
    pub fail_reads: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_flushes: AtomicBool,
    pub fail_removes: AtomicBool,
    pub panic_on_read: AtomicBool,
}

impl FaultSwitches {
    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        for flag in [
            &self.fail_reads,
            &self.fail_inserts,
            &self.fail_flushes,
            &self.fail_removes,
            &self.panic_on_read,
        ] {
            Self::set(flag, false);
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageDriverError::Unavailable(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

/// In-memory driver whose trees fail on demand
#[derive(Clone, Default)]
pub struct FaultyDriver {
    inner: MemoryStorageDriver,
    switches: Arc<FaultSwitches>,
}

impl FaultyDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switches(&self) -> Arc<FaultSwitches> {
        Arc::clone(&self.switches)
    }
}

struct FaultyTree {
    inner: Box<dyn StorageTree>,
    switches: Arc<FaultSwitches>,
}

impl FaultyTree {
    fn check_read(&self) -> StorageResult<()> {
        if self.switches.panic_on_read.load(Ordering::SeqCst) {
            panic!("storage read exploded");
        }
        FaultSwitches::check(&self.switches.fail_reads, "read")
    }
}

impl StorageTree for FaultyTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        FaultSwitches::check(&self.switches.fail_inserts, "insert")?;
        self.inner.insert(key, value)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.check_read()?;
        self.inner.get(key)
    }

    fn remove(&self, key: &[u8]) -> StorageResult<bool> {
        FaultSwitches::check(&self.switches.fail_removes, "remove")?;
        self.inner.remove(key)
    }

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool> {
        self.check_read()?;
        self.inner.contains_key(key)
    }

    fn clear(&self) -> StorageResult<()> {
        FaultSwitches::check(&self.switches.fail_removes, "clear")?;
        self.inner.clear()
    }

    fn len(&self) -> StorageResult<usize> {
        self.inner.len()
    }

    fn iter(&self) -> StorageResult<StorageIter<'_>> {
        self.check_read()?;
        self.inner.iter()
    }

    fn flush(&self) -> StorageResult<()> {
        FaultSwitches::check(&self.switches.fail_flushes, "flush")?;
        self.inner.flush()
    }
}

impl StorageDriver for FaultyDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(_path: P) -> StorageResult<Self> {
        Ok(Self::new())
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        Ok(Box::new(FaultyTree {
            inner: self.inner.open_tree(name)?,
            switches: self.switches(),
        }) as Box<dyn StorageTree>)
    }

    fn flush(&self) -> StorageResult<()> {
        FaultSwitches::check(&self.switches.fail_flushes, "flush")
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }
}

/// A cache over a [`FaultyDriver`], plus the switches that break it
pub fn faulty_cache(config: CacheConfig) -> (CacheManager, Arc<FaultSwitches>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let driver = FaultyDriver::new();
    let switches = driver.switches();
    let cache = CacheManager::with_driver(config, Box::new(driver)).expect("Failed to open cache");
    (cache, switches)
}

pub fn text(value: &str) -> CachedValue {
    CachedValue::text(value)
}

/// Memory accounted for an untagged entry with a one-byte key and this value
pub fn entry_size(value: &CachedValue) -> usize {
    CacheEntry::new("k", value.clone(), Duration::from_secs(60), Vec::<String>::new()).size_bytes()
}

/// Everything published so far, without waiting
pub fn drain(events: &mut broadcast::Receiver<CacheEvent>) -> Vec<CacheEvent> {
    let mut received = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => received.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    received
}
