// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Backend selection and driver errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which backend holds the persistent tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Sled - Pure Rust embedded database, one directory per cache
    /// Best for: durable cross-restart caching
    Sled,

    /// Process-local map; nothing survives a restart
    /// Best for: Unit testing, request-local caches
    Memory,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::Sled
    }
}

impl std::str::FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sled" => Ok(StorageType::Sled),
            "memory" => Ok(StorageType::Memory),
            _ => Err(format!(
                "Unknown storage type: {}. Valid options: sled, memory",
                s
            )),
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Sled => "sled",
            StorageType::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Failures raised by a storage backend
#[derive(Error, Debug)]
pub enum StorageDriverError {
    /// I/O related errors (file system)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Driver-specific error (Sled, ...)
    #[error("Storage driver error: {0}")]
    BackendSpecific(String),

    /// Backend not compiled into this build
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "sled-backend")]
impl From<sled::Error> for StorageDriverError {
    fn from(e: sled::Error) -> Self {
        StorageDriverError::BackendSpecific(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageDriverError>;
