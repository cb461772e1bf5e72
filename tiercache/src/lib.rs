// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! TierCache - A two-tier key/value cache
//!
//! Entries live in a memory tier bounded by a byte budget and are written
//! through to a durable tier (sled by default). Entries pushed out of memory
//! stay readable from disk until they expire or are revalidated.
//!
//! # Features
//!
//! - **TTL expiry**: expired data is never returned; reads purge it lazily
//! - **Tag revalidation**: invalidate every entry sharing a tag in one call
//! - **LRU demotion**: the memory budget is enforced by moving entries to disk
//! - **Compression**: optional gzip of persisted payloads
//! - **Fail-open**: operations never error; faults surface as events
//!
//! # Usage
//!
//! ```ignore
//! use tiercache::{CacheConfig, CacheManager, CachedValue};
//!
//! let cache = CacheManager::new(CacheConfig::at_path("./.tiercache"))?;
//! cache.set_with_tags("user:1", CachedValue::text("alice"), None, ["users"]);
//! assert!(cache.get("user:1").is_some());
//! cache.revalidate_tag("users");
//! cache.shutdown()?;
//! ```

pub mod cache;
pub mod error;
pub mod storage;

pub use cache::{
    CacheConfig, CacheEntry, CacheEvent, CacheManager, CacheStats, CachedValue, Operation,
    OperationMetric, Outcome,
};
pub use error::{CacheError, CacheResult};
pub use storage::StorageType;

/// TierCache version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TierCache crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
