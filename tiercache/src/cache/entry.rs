// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Cache entries and the opaque values they carry

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{CacheError, CacheResult};

/// Opaque payload plus the caller-supplied type discriminator
///
/// The cache never interprets `bytes`; `value_type` travels with the payload
/// through both tiers so callers can pick the right decoder on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedValue {
    pub value_type: String,
    pub bytes: Vec<u8>,
}

impl CachedValue {
    pub fn new(value_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            value_type: value_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Raw bytes tagged `bytes`
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new("bytes", bytes)
    }

    /// UTF-8 text tagged `text`
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text", text.into().into_bytes())
    }

    /// Encode a serde value as JSON under the given type tag
    pub fn json<T: Serialize>(value_type: impl Into<String>, value: &T) -> CacheResult<Self> {
        Ok(Self::new(value_type, serde_json::to_vec(value)?))
    }

    /// Decode a JSON payload, checking the type tag first
    pub fn decode_json<T: DeserializeOwned>(&self, expected_type: &str) -> CacheResult<T> {
        if self.value_type != expected_type {
            return Err(CacheError::Serialization(format!(
                "type tag mismatch: expected '{}', found '{}'",
                expected_type, self.value_type
            )));
        }
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A keyed value with its absolute expiry and tag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: CachedValue,
    pub expires_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    size_bytes: usize,
}

impl CacheEntry {
    /// Build an entry expiring `ttl` from now
    pub fn new<I, S>(key: impl Into<String>, value: CachedValue, ttl: Duration, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        // Persisted records carry millisecond precision; both tiers must agree
        let expires_at =
            DateTime::<Utc>::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at);
        Self::with_expiry(key, value, expires_at, tags)
    }

    /// Rebuild an entry with a known expiry (records loaded from disk)
    pub fn with_expiry<I, S>(
        key: impl Into<String>,
        value: CachedValue,
        expires_at: DateTime<Utc>,
        tags: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        let size_bytes = Self::measure(&key, &value, &tags);
        Self {
            key,
            value,
            expires_at,
            tags,
            size_bytes,
        }
    }

    /// Bytes charged against the memory budget
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn measure(key: &str, value: &CachedValue, tags: &BTreeSet<String>) -> usize {
        key.len()
            + value.value_type.len()
            + value.bytes.len()
            + tags.iter().map(String::len).sum::<usize>()
            + std::mem::size_of::<Self>()
    }
}
