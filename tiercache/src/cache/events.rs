// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Structured cache events and running statistics
//!
//! Events go out on a broadcast channel so a monitoring collaborator can
//! subscribe without the cache knowing who listens. Publishing never blocks
//! and never affects the operation that produced the event.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Public operations that are timed and reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    Set,
    RevalidateTag,
    Delete,
    Sweep,
    Clear,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::RevalidateTag => "revalidate_tag",
            Operation::Delete => "delete",
            Operation::Sweep => "sweep",
            Operation::Clear => "clear",
        };
        write!(f, "{}", name)
    }
}

/// How an operation ended
///
/// Reads report `Hit`/`Miss`; writes and invalidations report `Ok`, or
/// `Rejected` when a write was refused without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Hit,
    Miss,
    Ok,
    Rejected,
    Error,
}

/// One timed operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMetric {
    pub operation: Operation,
    /// Key, or tag for `RevalidateTag`
    pub target: String,
    pub duration_ms: f64,
    pub outcome: Outcome,
}

impl OperationMetric {
    pub fn new(operation: Operation, target: &str, duration: Duration, outcome: Outcome) -> Self {
        Self {
            operation,
            target: target.to_string(),
            duration_ms: duration.as_micros() as f64 / 1000.0,
            outcome,
        }
    }
}

/// Everything the cache reports about itself
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Operation(OperationMetric),
    SlowOperation {
        metric: OperationMetric,
        threshold_ms: u64,
    },
    Fault {
        operation: Operation,
        target: String,
        kind: String,
        error: String,
    },
    /// Demoted from memory; still retrievable from the persistent tier
    Eviction { key: String, size_bytes: usize },
    Expired { key: String },
    Revalidated { tag: String, keys_invalidated: usize },
}

/// Fan-out channel for [`CacheEvent`]s
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: CacheEvent) {
        // An error only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Point-in-time snapshot of cache statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub sets: u64,
    pub rejected_sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub revalidations: u64,
    pub invalidated_keys: u64,
    pub faults: u64,
    pub slow_operations: u64,
    pub resident_bytes: usize,
    pub resident_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub memory_hits: AtomicU64,
    pub persistent_hits: AtomicU64,
    pub sets: AtomicU64,
    pub rejected_sets: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
    pub revalidations: AtomicU64,
    pub invalidated_keys: AtomicU64,
    pub faults: AtomicU64,
    pub slow_operations: AtomicU64,
    pub resident_bytes: AtomicUsize,
    pub resident_entries: AtomicUsize,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set_residency(&self, bytes: usize, entries: usize) {
        self.resident_bytes.store(bytes, Ordering::Relaxed);
        self.resident_entries.store(entries, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.hits),
            misses: load(&self.misses),
            memory_hits: load(&self.memory_hits),
            persistent_hits: load(&self.persistent_hits),
            sets: load(&self.sets),
            rejected_sets: load(&self.rejected_sets),
            evictions: load(&self.evictions),
            expirations: load(&self.expirations),
            revalidations: load(&self.revalidations),
            invalidated_keys: load(&self.invalidated_keys),
            faults: load(&self.faults),
            slow_operations: load(&self.slow_operations),
            resident_bytes: self.resident_bytes.load(Ordering::Relaxed),
            resident_entries: self.resident_entries.load(Ordering::Relaxed),
        }
    }
}
