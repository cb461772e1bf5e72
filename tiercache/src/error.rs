// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for the cache
//!
//! Every variant is contained at the instrumentation boundary; callers of the
//! public operations only ever observe a miss or a rejected write.

use thiserror::Error;

use crate::storage::StorageDriverError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// I/O failure reading or writing the persistent tier
    #[error("Storage fault: {0}")]
    StorageFault(String),

    /// A persistent record failed to deserialize or decompress
    #[error("Corrupt record for key '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    /// A single value is larger than the whole memory budget
    #[error("Value for key '{key}' is {size} bytes, exceeding the memory budget of {budget} bytes")]
    CapacityExceeded {
        key: String,
        size: usize,
        budget: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Short, stable name used in structured events
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::StorageFault(_) => "storage_fault",
            CacheError::CorruptRecord { .. } => "corrupt_record",
            CacheError::CapacityExceeded { .. } => "capacity_exceeded",
            CacheError::InvalidConfig(_) => "invalid_config",
            CacheError::Serialization(_) => "serialization",
        }
    }
}

impl From<StorageDriverError> for CacheError {
    fn from(err: StorageDriverError) -> Self {
        CacheError::StorageFault(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::StorageFault(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
