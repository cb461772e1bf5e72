// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Optional gzip transform applied to records entering the persistent tier

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{CacheError, CacheResult};

/// Reversible byte transform; identity when disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionCodec {
    enabled: bool,
    level: u32,
}

impl CompressionCodec {
    pub const DEFAULT_LEVEL: u32 = 6;

    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            level: Self::DEFAULT_LEVEL,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Compression level 0-9
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn encode(&self, bytes: &[u8]) -> CacheResult<Vec<u8>> {
        if !self.enabled {
            return Ok(bytes.to_vec());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(bytes)
            .map_err(|e| CacheError::StorageFault(format!("compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| CacheError::StorageFault(format!("compression finish failed: {}", e)))
    }

    /// Decoding failures surface as `Serialization`; the persistent tier
    /// reports them against the offending key as a corrupt record.
    pub fn decode(&self, bytes: &[u8]) -> CacheResult<Vec<u8>> {
        if !self.enabled {
            return Ok(bytes.to_vec());
        }
        let mut decoder = GzDecoder::new(bytes);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| CacheError::Serialization(format!("decompression failed: {}", e)))?;
        Ok(decompressed)
    }
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self::disabled()
    }
}
