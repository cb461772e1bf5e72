// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Two-tier caching system
//!
//! This module provides:
//! - A memory tier bounded by a byte budget, with LRU demotion
//! - A persistent tier that keeps every entry across evictions and restarts
//! - Tag-scoped bulk invalidation
//! - Optional gzip compression of persisted payloads
//! - Timed, fail-open operations reporting on a structured event channel

pub mod cache_config;
pub mod cache_manager;
pub mod compression;
pub mod entry;
pub mod events;
pub mod instrumentation;
pub mod persistent_tier;
pub mod revalidation;
pub mod store;
pub mod sweeper;

pub use cache_config::CacheConfig;
pub use cache_manager::CacheManager;
pub use compression::CompressionCodec;
pub use entry::{CacheEntry, CachedValue};
pub use events::{CacheEvent, CacheStats, EventBus, Operation, OperationMetric, Outcome};
pub use instrumentation::InstrumentedCache;
pub use persistent_tier::PersistentTier;
pub use revalidation::RevalidationIndex;
pub use store::CacheStore;
