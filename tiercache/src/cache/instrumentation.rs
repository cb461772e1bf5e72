// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Timing and fault containment around the public cache operations
//!
//! Every call is timed and reported as an [`OperationMetric`]. Calls slower
//! than the configured threshold additionally produce a warning and a
//! [`CacheEvent::SlowOperation`]; that never changes what the caller gets.
//!
//! Errors and panics from the store stop here. The caller receives the
//! fail-open default for the operation (a miss, or `false`) and the failure is
//! reported as a [`CacheEvent::Fault`].

use log::{error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::entry::CachedValue;
use super::events::{CacheEvent, EventBus, Operation, OperationMetric, Outcome, StatsCounters};
use super::store::CacheStore;
use crate::error::{CacheError, CacheResult};

/// Fail-open facade over a [`CacheStore`]
#[derive(Clone)]
pub struct InstrumentedCache {
    store: Arc<CacheStore>,
    events: Arc<EventBus>,
    stats: Arc<StatsCounters>,
    slow_threshold: Duration,
}

impl InstrumentedCache {
    pub fn new(
        store: Arc<CacheStore>,
        events: Arc<EventBus>,
        stats: Arc<StatsCounters>,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            store,
            events,
            stats,
            slow_threshold,
        }
    }

    /// Value for `key`, or `None` on a miss or any internal failure
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.run(
            Operation::Get,
            key,
            || self.store.get(key),
            |found| match found {
                Some(_) => Outcome::Hit,
                None => Outcome::Miss,
            },
            None,
        )
    }

    /// Whether the write was accepted into both tiers
    pub fn set(
        &self,
        key: &str,
        value: CachedValue,
        ttl: Option<Duration>,
        tags: &[String],
    ) -> bool {
        self.run(
            Operation::Set,
            key,
            || self.store.set(key, value, ttl, tags.iter().cloned()).map(|_| true),
            |_| Outcome::Ok,
            false,
        )
    }

    /// `true` once every key under `tag` is gone, including when there were none
    pub fn revalidate_tag(&self, tag: &str) -> bool {
        self.run(
            Operation::RevalidateTag,
            tag,
            || self.store.revalidate_tag(tag).map(|_| true),
            |_| Outcome::Ok,
            false,
        )
    }

    /// Whether the key existed; `false` also covers internal failures
    pub fn delete(&self, key: &str) -> bool {
        self.run(
            Operation::Delete,
            key,
            || self.store.delete(key),
            |existed| if *existed { Outcome::Ok } else { Outcome::Miss },
            false,
        )
    }

    /// Number of expired entries purged; `0` on failure
    pub fn sweep(&self) -> usize {
        self.run(
            Operation::Sweep,
            "*",
            || self.store.sweep_expired(),
            |_| Outcome::Ok,
            0,
        )
    }

    /// Whether both tiers and the index were emptied
    pub fn clear(&self) -> bool {
        self.run(
            Operation::Clear,
            "*",
            || self.store.clear().map(|_| true),
            |_| Outcome::Ok,
            false,
        )
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    fn run<T>(
        &self,
        operation: Operation,
        target: &str,
        op: impl FnOnce() -> CacheResult<T>,
        classify: impl FnOnce(&T) -> Outcome,
        fallback: T,
    ) -> T {
        let started = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(op)) {
            Ok(result) => result,
            Err(payload) => Err(CacheError::StorageFault(panic_message(payload.as_ref()))),
        };
        let elapsed = started.elapsed();

        let (value, outcome) = match result {
            Ok(value) => {
                let outcome = classify(&value);
                (value, outcome)
            }
            Err(err) => (fallback, self.contain(operation, target, &err)),
        };

        match outcome {
            Outcome::Hit => StatsCounters::incr(&self.stats.hits),
            Outcome::Miss if operation == Operation::Get => StatsCounters::incr(&self.stats.misses),
            Outcome::Error if operation == Operation::Get => {
                StatsCounters::incr(&self.stats.misses)
            }
            _ => {}
        }

        let metric = OperationMetric::new(operation, target, elapsed, outcome);
        if elapsed > self.slow_threshold {
            StatsCounters::incr(&self.stats.slow_operations);
            warn!(
                "slow cache operation: {} '{}' took {:.3}ms (threshold {}ms)",
                operation,
                target,
                metric.duration_ms,
                self.slow_threshold.as_millis()
            );
            self.events.publish(CacheEvent::SlowOperation {
                metric: metric.clone(),
                threshold_ms: self.slow_threshold.as_millis() as u64,
            });
        }
        self.events.publish(CacheEvent::Operation(metric));

        value
    }

    fn contain(&self, operation: Operation, target: &str, err: &CacheError) -> Outcome {
        let outcome = match err {
            CacheError::CapacityExceeded { .. } => {
                warn!("cache {} '{}' rejected: {}", operation, target, err);
                Outcome::Rejected
            }
            _ => {
                error!("cache {} '{}' failed: {}", operation, target, err);
                Outcome::Error
            }
        };

        StatsCounters::incr(&self.stats.faults);
        self.events.publish(CacheEvent::Fault {
            operation,
            target: target.to_string(),
            kind: err.kind().to_string(),
            error: err.to_string(),
        });
        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic in cache operation".to_string()
    }
}
