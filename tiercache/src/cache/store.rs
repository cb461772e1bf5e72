// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Two-tier cache store
//!
//! Memory is the authoritative copy once written; every write goes through to
//! the persistent tier before it becomes visible. Entries pushed out of memory
//! by the byte budget are demoted, not dropped: they stay on disk and are
//! promoted back on the next read.
//!
//! # Locking
//!
//! - `memory` and `index` each sit behind a short-lived lock that is never
//!   held across storage I/O.
//! - Per-key stripes (`KeyLocks`) serialize everything that touches one key's
//!   value, expiry, tags and disk record, so those change as one unit. The
//!   stripe is the only lock held across I/O; unrelated keys land on
//!   different stripes.
//! - Lock order is stripe, then memory or index. Nothing that holds the memory
//!   or index lock ever takes a stripe.
//!
//! # Failed writes
//!
//! A write or removal that fails part way leaves the key absent from memory,
//! so the next read consults the persistent tier. The index keeps every tag
//! the on-disk record might carry until the record is known to be gone.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::cache_config::CacheConfig;
use super::entry::{CacheEntry, CachedValue};
use super::events::{CacheEvent, EventBus, StatsCounters};
use super::persistent_tier::{PersistentTier, ScannedRecord};
use super::revalidation::RevalidationIndex;
use crate::error::{CacheError, CacheResult};

/// LRU eviction tracker keyed by a monotonically increasing access tick
#[derive(Debug, Default)]
struct LruTracker {
    order: BTreeMap<u64, String>,
    ticks: HashMap<String, u64>,
    clock: u64,
}

impl LruTracker {
    fn access(&mut self, key: &str) {
        self.clock += 1;
        if let Some(previous) = self.ticks.insert(key.to_string(), self.clock) {
            self.order.remove(&previous);
        }
        self.order.insert(self.clock, key.to_string());
    }

    fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    fn pop_lru(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ticks.clear();
    }
}

enum Probe {
    Fresh(CachedValue),
    Expired,
    Absent,
}

#[derive(Debug, Default)]
struct MemoryTier {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    resident_bytes: usize,
}

impl MemoryTier {
    fn probe(&mut self, key: &str, now: DateTime<Utc>) -> Probe {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => Probe::Expired,
            Some(entry) => {
                let value = entry.value.clone();
                self.lru.access(key);
                Probe::Fresh(value)
            }
            None => Probe::Absent,
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.resident_bytes = self.resident_bytes.saturating_sub(entry.size_bytes());
        Some(entry)
    }

    /// Insert, demoting least-recently-used entries until the new one fits.
    /// Returns the demoted keys with their sizes.
    fn insert(&mut self, entry: CacheEntry, budget: usize) -> Vec<(String, usize)> {
        self.remove(&entry.key);

        let size = entry.size_bytes();
        let mut demoted = Vec::new();
        while self.resident_bytes + size > budget {
            let Some(victim) = self.lru.pop_lru() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&victim) {
                self.resident_bytes = self.resident_bytes.saturating_sub(evicted.size_bytes());
                demoted.push((victim, evicted.size_bytes()));
            }
        }

        self.resident_bytes += size;
        self.lru.access(&entry.key);
        self.entries.insert(entry.key.clone(), entry);
        demoted
    }

    fn expired_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.resident_bytes = 0;
    }
}

/// Striped per-key mutexes
struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let slot = crc32fast::hash(key.as_bytes()) as usize % self.stripes.len();
        self.stripes[slot].lock()
    }
}

/// In-memory tier over a persistent tier, with a tag index spanning both
pub struct CacheStore {
    memory: Mutex<MemoryTier>,
    persistent: PersistentTier,
    index: RevalidationIndex,
    locks: KeyLocks,
    max_memory_bytes: usize,
    default_ttl: Duration,
    events: Arc<EventBus>,
    stats: Arc<StatsCounters>,
}

impl CacheStore {
    /// Open the store and rebuild the tag index from the persistent tier.
    /// Expired and corrupt records found on the way are purged.
    pub fn open(
        config: &CacheConfig,
        persistent: PersistentTier,
        events: Arc<EventBus>,
        stats: Arc<StatsCounters>,
    ) -> CacheResult<Self> {
        let store = Self {
            memory: Mutex::new(MemoryTier::default()),
            persistent,
            index: RevalidationIndex::new(),
            locks: KeyLocks::new(config.lock_stripes),
            max_memory_bytes: config.max_memory_bytes,
            default_ttl: config.default_ttl(),
            events,
            stats,
        };
        store.rebuild_index()?;
        Ok(store)
    }

    /// Look up a key. Expired data is never returned: an expired entry is
    /// purged from both tiers and reported as a miss.
    pub fn get(&self, key: &str) -> CacheResult<Option<CachedValue>> {
        let now = Utc::now();

        if let Probe::Fresh(value) = self.memory.lock().probe(key, now) {
            StatsCounters::incr(&self.stats.memory_hits);
            return Ok(Some(value));
        }

        let _guard = self.locks.lock(key);

        // Re-check: a writer may have landed while we waited for the stripe
        let probe = self.memory.lock().probe(key, now);
        match probe {
            Probe::Fresh(value) => {
                StatsCounters::incr(&self.stats.memory_hits);
                return Ok(Some(value));
            }
            Probe::Expired => {
                self.purge(key)?;
                self.note_expired(key);
                return Ok(None);
            }
            Probe::Absent => {}
        }

        let entry = match self.persistent.load(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(err @ CacheError::CorruptRecord { .. }) => {
                self.index.remove_key(key);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if entry.is_expired_at(now) {
            self.purge(key)?;
            self.note_expired(key);
            return Ok(None);
        }

        debug!("promoting '{}' from the persistent tier", key);
        StatsCounters::incr(&self.stats.persistent_hits);
        let value = entry.value.clone();
        self.admit(entry);
        Ok(Some(value))
    }

    /// Write an entry through both tiers and make `tags` its complete tag set.
    /// `ttl` falls back to the configured default.
    ///
    /// On a persistent failure the key is dropped rather than left with the
    /// old entry in memory and the new one on disk.
    pub fn set<I, S>(
        &self,
        key: &str,
        value: CachedValue,
        ttl: Option<Duration>,
        tags: I,
    ) -> CacheResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = CacheEntry::new(key, value, ttl.unwrap_or(self.default_ttl), tags);
        if entry.size_bytes() > self.max_memory_bytes {
            StatsCounters::incr(&self.stats.rejected_sets);
            return Err(CacheError::CapacityExceeded {
                key: key.to_string(),
                size: entry.size_bytes(),
                budget: self.max_memory_bytes,
            });
        }

        let _guard = self.locks.lock(key);
        if let Err(err) = self.persistent.store(&entry) {
            self.reconcile_after_fault(key, &entry.tags);
            return Err(err);
        }
        self.index.replace(key, &entry.tags);
        self.admit(entry);
        StatsCounters::incr(&self.stats.sets);
        Ok(())
    }

    /// Remove one key from both tiers and the index
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        let _guard = self.locks.lock(key);
        let on_disk = match self.persistent.remove(key) {
            Ok(existed) => existed,
            Err(err) => {
                self.reconcile_after_fault(key, &BTreeSet::new());
                return Err(err);
            }
        };
        let in_memory = self.with_memory(|memory| memory.remove(key)).is_some();
        self.index.remove_key(key);
        Ok(on_disk || in_memory)
    }

    /// Invalidate every key carrying `tag`, returning how many were removed.
    ///
    /// Each key is removed under its stripe and only if it still carries the
    /// tag, so a concurrent re-`set` with a different tag set survives and a
    /// reader sees either the whole entry or a miss.
    pub fn revalidate_tag(&self, tag: &str) -> CacheResult<usize> {
        let mut invalidated = 0;
        for key in self.index.keys_for(tag) {
            let _guard = self.locks.lock(&key);
            if !self.index.has_tag(&key, tag) {
                continue;
            }
            self.purge(&key)?;
            invalidated += 1;
        }

        StatsCounters::incr(&self.stats.revalidations);
        StatsCounters::add(&self.stats.invalidated_keys, invalidated as u64);
        debug!("revalidated tag '{}': {} keys invalidated", tag, invalidated);
        self.events.publish(CacheEvent::Revalidated {
            tag: tag.to_string(),
            keys_invalidated: invalidated,
        });
        Ok(invalidated)
    }

    /// Proactively purge expired entries from both tiers.
    /// Lazy expiry on read stays the source of truth; this only bounds how
    /// long stale data occupies space.
    pub fn sweep_expired(&self) -> CacheResult<usize> {
        let now = Utc::now();
        let mut candidates: BTreeSet<String> =
            self.memory.lock().expired_keys(now).into_iter().collect();

        let mut unreadable = Vec::new();
        self.persistent.scan_metadata(|record| match record {
            ScannedRecord::Valid(meta) if meta.is_expired_at(now) => {
                candidates.insert(meta.key);
            }
            ScannedRecord::Valid(_) => {}
            ScannedRecord::Corrupt { raw_key, reason } => match String::from_utf8(raw_key) {
                // Reloading under the stripe discards it if still corrupt
                Ok(key) => {
                    candidates.insert(key);
                }
                Err(bad) => unreadable.push((bad.into_bytes(), reason)),
            },
        })?;

        for (raw_key, reason) in unreadable {
            warn!("removing unreadable record during sweep: {}", reason);
            self.persistent.remove_raw(&raw_key)?;
        }

        let mut purged = 0;
        for key in candidates {
            let _guard = self.locks.lock(&key);
            if self.purge_if_stale(&key, now)? {
                purged += 1;
            }
        }

        if purged > 0 {
            info!("sweep purged {} expired entries", purged);
        }
        Ok(purged)
    }

    /// Drop everything from both tiers and the index
    pub fn clear(&self) -> CacheResult<()> {
        self.persistent.clear()?;
        self.with_memory(MemoryTier::clear);
        self.index.clear();
        info!("cache cleared");
        Ok(())
    }

    /// Flush and release the persistent tier; later calls fault
    pub fn close(&self) -> CacheResult<()> {
        self.persistent.close()
    }

    /// Whether `key` currently occupies the memory tier
    pub fn is_resident(&self, key: &str) -> bool {
        self.memory.lock().entries.contains_key(key)
    }

    pub fn resident_bytes(&self) -> usize {
        self.memory.lock().resident_bytes
    }

    pub fn resident_entries(&self) -> usize {
        self.memory.lock().entries.len()
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_bytes
    }

    pub fn persistent(&self) -> &PersistentTier {
        &self.persistent
    }

    pub fn index(&self) -> &RevalidationIndex {
        &self.index
    }

    /// Caller holds the key's stripe
    fn purge(&self, key: &str) -> CacheResult<()> {
        if let Err(err) = self.persistent.remove(key) {
            self.reconcile_after_fault(key, &BTreeSet::new());
            return Err(err);
        }
        self.with_memory(|memory| memory.remove(key));
        self.index.remove_key(key);
        Ok(())
    }

    /// Bring memory and the index back in line with disk after a failed
    /// persistent write or removal. `attempted_tags` are the tags the failed
    /// write may have left on disk. Caller holds the key's stripe.
    fn reconcile_after_fault(&self, key: &str, attempted_tags: &BTreeSet<String>) {
        self.with_memory(|memory| memory.remove(key));

        let gone = match self.persistent.remove(key) {
            Ok(_) => true,
            Err(_) => matches!(self.persistent.contains(key), Ok(false)),
        };
        if gone {
            self.index.remove_key(key);
        } else {
            warn!(
                "'{}' may still be on disk after a failed write; keeping its tags indexed",
                key
            );
            self.index.tag(key, attempted_tags);
        }
    }

    /// Caller holds the key's stripe
    fn purge_if_stale(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
        let probe = self.memory.lock().probe(key, now);
        match probe {
            Probe::Fresh(_) => Ok(false),
            Probe::Expired => {
                self.purge(key)?;
                self.note_expired(key);
                Ok(true)
            }
            Probe::Absent => match self.persistent.load(key) {
                Ok(Some(entry)) if entry.is_expired_at(now) => {
                    self.purge(key)?;
                    self.note_expired(key);
                    Ok(true)
                }
                Ok(_) => Ok(false),
                Err(CacheError::CorruptRecord { .. }) => {
                    self.index.remove_key(key);
                    Ok(true)
                }
                Err(err) => Err(err),
            },
        }
    }

    /// Place an entry in memory, demoting LRU entries to make room.
    /// Entries larger than the whole budget stay disk-only.
    fn admit(&self, entry: CacheEntry) {
        if entry.size_bytes() > self.max_memory_bytes {
            debug!(
                "'{}' ({} bytes) exceeds the memory budget; serving from disk only",
                entry.key,
                entry.size_bytes()
            );
            return;
        }

        let budget = self.max_memory_bytes;
        let demoted = self.with_memory(|memory| memory.insert(entry, budget));
        for (key, size_bytes) in demoted {
            StatsCounters::incr(&self.stats.evictions);
            debug!("demoted '{}' ({} bytes) to the persistent tier", key, size_bytes);
            self.events
                .publish(CacheEvent::Eviction { key, size_bytes });
        }
    }

    fn with_memory<R>(&self, f: impl FnOnce(&mut MemoryTier) -> R) -> R {
        let mut memory = self.memory.lock();
        let result = f(&mut memory);
        self.stats
            .set_residency(memory.resident_bytes, memory.entries.len());
        result
    }

    fn note_expired(&self, key: &str) {
        StatsCounters::incr(&self.stats.expirations);
        debug!("'{}' expired", key);
        self.events.publish(CacheEvent::Expired {
            key: key.to_string(),
        });
    }

    fn rebuild_index(&self) -> CacheResult<()> {
        let now = Utc::now();
        let mut live = 0;
        let mut stale = Vec::new();

        self.persistent.scan_metadata(|record| match record {
            ScannedRecord::Valid(meta) if meta.is_expired_at(now) => {
                stale.push(meta.key.into_bytes());
            }
            ScannedRecord::Valid(meta) => {
                self.index.tag(&meta.key, &meta.tags);
                live += 1;
            }
            ScannedRecord::Corrupt { raw_key, reason } => {
                warn!(
                    "removing corrupt record '{}' at startup: {}",
                    String::from_utf8_lossy(&raw_key),
                    reason
                );
                stale.push(raw_key);
            }
        })?;

        let purged = stale.len();
        for raw_key in stale {
            self.persistent.remove_raw(&raw_key)?;
        }

        info!(
            "tag index rebuilt: {} live records, {} tags, {} stale records purged",
            live,
            self.index.tag_count(),
            purged
        );
        Ok(())
    }
}
