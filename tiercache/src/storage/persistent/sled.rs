// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Durable backend on sled

use super::traits::{StorageDriver, StorageIter, StorageTree};
use super::types::{StorageResult, StorageType};
use std::path::Path;

/// One sled database per cache directory
pub struct SledDriver {
    db: sled::Db,
}

pub struct SledTree {
    tree: sled::Tree,
}

impl StorageTree for SledTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.tree.remove(key)?.is_some())
    }

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.tree.contains_key(key)?)
    }

    fn clear(&self) -> StorageResult<()> {
        Ok(self.tree.clear()?)
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.tree.len())
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.tree.is_empty())
    }

    fn iter(&self) -> StorageResult<StorageIter<'_>> {
        let iter = self.tree.iter().map(|result| {
            result
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(Into::into)
        });
        Ok(Box::new(iter))
    }

    fn flush(&self) -> StorageResult<()> {
        self.tree.flush()?;
        Ok(())
    }
}

impl StorageDriver for SledDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        std::fs::create_dir_all(path.as_ref())?;
        let db = sled::open(path)?;
        Ok(SledDriver { db })
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        let tree = self.db.open_tree(name)?;
        Ok(Box::new(SledTree { tree }) as Box<dyn StorageTree>)
    }

    fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Sled
    }

    fn shutdown(&mut self) -> StorageResult<()> {
        // Sled releases its file lock when the last handle drops; flushing
        // here guarantees nothing buffered is lost before that.
        self.db.flush()?;
        Ok(())
    }
}
