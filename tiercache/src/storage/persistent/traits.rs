// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Key/value abstraction under the persistent tier
//!
//! The cache only needs whole-value puts, point reads, deletes and a full
//! scan at startup, so that is all a backend has to provide.

use super::types::{StorageResult, StorageType};
use std::path::Path;

/// Owned key/value pairs produced by a full tree scan
pub type StorageIter<'a> = Box<dyn Iterator<Item = StorageResult<(Vec<u8>, Vec<u8>)>> + 'a>;

/// Named keyspace inside a driver
///
/// A single `insert` must replace the prior value for the key atomically;
/// readers never observe a half-written record.
pub trait StorageTree: Send + Sync {
    /// Replace the value stored under `key`
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Remove a key-value pair, returning whether it existed
    fn remove(&self, key: &[u8]) -> StorageResult<bool>;

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool>;

    /// Delete every record
    fn clear(&self) -> StorageResult<()>;

    /// Number of records held by the tree
    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot-or-live scan of every record, in backend order
    fn iter(&self) -> StorageResult<StorageIter<'_>>;

    /// Make previous writes durable
    fn flush(&self) -> StorageResult<()>;
}

/// A storage backend that hands out trees
pub trait StorageDriver: Send + Sync {
    type Tree: StorageTree;

    /// Open the backend rooted at `path`, creating it if needed
    fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self>
    where
        Self: Sized;

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree>;

    fn flush(&self) -> StorageResult<()>;

    fn storage_type(&self) -> StorageType;

    /// Final flush before the driver is dropped at cache shutdown
    fn shutdown(&mut self) -> StorageResult<()> {
        self.flush()
    }
}

impl StorageTree for Box<dyn StorageTree> {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).insert(key, value)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn remove(&self, key: &[u8]) -> StorageResult<bool> {
        (**self).remove(key)
    }

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool> {
        (**self).contains_key(key)
    }

    fn clear(&self) -> StorageResult<()> {
        (**self).clear()
    }

    fn len(&self) -> StorageResult<usize> {
        (**self).len()
    }

    fn iter(&self) -> StorageResult<StorageIter<'_>> {
        (**self).iter()
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }
}
