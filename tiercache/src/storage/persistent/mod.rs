// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent storage backends
//!
//! Trait-based abstractions for persistent key-value storage, allowing the
//! durable cache tier to run on sled in production and on an in-memory map
//! in tests.
//!
//! # Architecture
//!
//! ```text
//! PersistentTier (record framing, compression)
//!     ↓
//! StorageDriver / StorageTree (key-value abstraction)
//!     ↓
//! Concrete Implementations (Sled, Memory)
//! ```

pub mod factory;
pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled;
pub mod traits;
pub mod types;

pub use factory::{create_storage_driver, BoxedStorageDriver};
pub use memory::MemoryStorageDriver;
pub use traits::{StorageDriver, StorageIter, StorageTree};
pub use types::{StorageDriverError, StorageResult, StorageType};
