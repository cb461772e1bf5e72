// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Durable storage used by the cache's persistent tier

pub mod persistent;

pub use persistent::{
    create_storage_driver, BoxedStorageDriver, StorageDriver, StorageDriverError, StorageTree,
    StorageType,
};
