// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Durable tier: one framed record per key on top of a storage driver
//!
//! Record layout (little endian):
//!
//! ```text
//! magic u32 | version u16 | flags u8 | meta_len u32 | payload_len u32
//! | meta | payload | crc32 u32
//! ```
//!
//! `meta` is the bincode-encoded key, value type, expiry and tags and is never
//! compressed, so scans can read it without touching the value. `payload` is
//! the raw value bytes, gzip-compressed when flag bit 0 is set. The checksum
//! covers every preceding byte. Records are decoded by their own flag, so
//! toggling compression never strands older records.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::compression::CompressionCodec;
use super::entry::{CacheEntry, CachedValue};
use crate::error::{CacheError, CacheResult};
use crate::storage::StorageTree;

/// Magic number identifying cache records ("TCR1")
const RECORD_MAGIC: u32 = 0x5443_5231;
/// Current record format version
const RECORD_VERSION: u16 = 2;
const FLAG_COMPRESSED: u8 = 0b0000_0001;
/// magic + version + flags + meta length + payload length
const HEADER_LEN: usize = 4 + 2 + 1 + 4 + 4;
const CHECKSUM_LEN: usize = 4;

#[derive(Serialize, Deserialize)]
struct StoredMeta {
    key: String,
    value_type: String,
    expires_at_ms: i64,
    tags: Vec<String>,
}

/// Key, expiry and tags of a record, read without decoding its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
}

impl RecordMeta {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of reading one record's metadata during a scan
#[derive(Debug)]
pub enum ScannedRecord {
    Valid(RecordMeta),
    Corrupt { raw_key: Vec<u8>, reason: String },
}

/// Durable backing store for cache entries.
///
/// The tree is dropped by [`PersistentTier::close`]; every call after that
/// fails with `StorageFault`.
pub struct PersistentTier {
    tree: RwLock<Option<Box<dyn StorageTree>>>,
    codec: CompressionCodec,
    sync_writes: bool,
}

impl PersistentTier {
    pub fn new(tree: Box<dyn StorageTree>, codec: CompressionCodec, sync_writes: bool) -> Self {
        Self {
            tree: RwLock::new(Some(tree)),
            codec,
            sync_writes,
        }
    }

    /// Read a record. Missing records are `Ok(None)`; a corrupt record is
    /// deleted before `CorruptRecord` is returned so it cannot fail twice.
    pub fn load(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let Some(raw) = self.with_tree(|tree| Ok(tree.get(key.as_bytes())?))? else {
            return Ok(None);
        };

        match decode_record(&raw) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(entry) => {
                let reason = format!("record belongs to key '{}'", entry.key);
                Err(self.discard_corrupt(key, reason))
            }
            Err(reason) => Err(self.discard_corrupt(key, reason)),
        }
    }

    /// Serialize and write through, replacing any prior record for the key.
    ///
    /// An error may arrive after the record reached the tree (a failed flush),
    /// so callers must treat the key's on-disk state as unknown on `Err`.
    pub fn store(&self, entry: &CacheEntry) -> CacheResult<()> {
        let record = encode_record(entry, &self.codec)?;
        self.with_tree(|tree| {
            tree.insert(entry.key.as_bytes(), &record)?;
            if self.sync_writes {
                tree.flush()?;
            }
            Ok(())
        })?;
        debug!(
            "persisted '{}' ({} bytes on disk, compressed: {})",
            entry.key,
            record.len(),
            self.codec.is_enabled()
        );
        Ok(())
    }

    /// Delete a record; removing an absent key is not an error
    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        self.remove_raw(key.as_bytes())
    }

    pub fn remove_raw(&self, raw_key: &[u8]) -> CacheResult<bool> {
        self.with_tree(|tree| {
            let existed = tree.remove(raw_key)?;
            if existed && self.sync_writes {
                tree.flush()?;
            }
            Ok(existed)
        })
    }

    pub fn contains(&self, key: &str) -> CacheResult<bool> {
        self.with_tree(|tree| Ok(tree.contains_key(key.as_bytes())?))
    }

    /// Walk every record, handing `visit` its metadata. Values are never
    /// decoded or retained. `visit` runs with the tree borrowed and must not
    /// call back into the tier.
    pub fn scan_metadata(&self, mut visit: impl FnMut(ScannedRecord)) -> CacheResult<()> {
        self.with_tree(|tree| {
            for item in tree.iter()? {
                let (raw_key, raw) = item?;
                let scanned = match (std::str::from_utf8(&raw_key), decode_meta(&raw)) {
                    (Ok(key), Ok(meta)) if meta.key == key => ScannedRecord::Valid(meta),
                    (Ok(_), Ok(meta)) => ScannedRecord::Corrupt {
                        raw_key,
                        reason: format!("record belongs to key '{}'", meta.key),
                    },
                    (Err(_), _) => ScannedRecord::Corrupt {
                        raw_key,
                        reason: "key is not valid UTF-8".to_string(),
                    },
                    (Ok(_), Err(reason)) => ScannedRecord::Corrupt { raw_key, reason },
                };
                visit(scanned);
            }
            Ok(())
        })
    }

    pub fn len(&self) -> CacheResult<usize> {
        self.with_tree(|tree| Ok(tree.len()?))
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        self.with_tree(|tree| Ok(tree.is_empty()?))
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.with_tree(|tree| {
            tree.clear()?;
            tree.flush()?;
            Ok(())
        })
    }

    /// Flush and release the tree. Waits for in-flight calls; idempotent.
    pub fn close(&self) -> CacheResult<()> {
        let Some(tree) = self.tree.write().take() else {
            return Ok(());
        };
        tree.flush()?;
        debug!("persistent tier closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tree.read().is_none()
    }

    fn with_tree<R>(
        &self,
        op: impl FnOnce(&dyn StorageTree) -> CacheResult<R>,
    ) -> CacheResult<R> {
        let guard = self.tree.read();
        match guard.as_deref() {
            Some(tree) => op(tree),
            None => Err(CacheError::StorageFault(
                "persistent tier is closed".to_string(),
            )),
        }
    }

    fn discard_corrupt(&self, key: &str, reason: String) -> CacheError {
        warn!("discarding corrupt record for '{}': {}", key, reason);
        if let Err(e) = self.remove(key) {
            warn!("failed to remove corrupt record for '{}': {}", key, e);
        }
        CacheError::CorruptRecord {
            key: key.to_string(),
            reason,
        }
    }
}

/// Frame an entry as a durable record
pub fn encode_record(entry: &CacheEntry, codec: &CompressionCodec) -> CacheResult<Vec<u8>> {
    let meta = StoredMeta {
        key: entry.key.clone(),
        value_type: entry.value.value_type.clone(),
        expires_at_ms: entry.expires_at.timestamp_millis(),
        tags: entry.tags.iter().cloned().collect(),
    };
    let meta = bincode::serialize(&meta)
        .map_err(|e| CacheError::Serialization(format!("record encode failed: {}", e)))?;
    let payload = codec.encode(&entry.value.bytes)?;
    let too_large =
        |_| CacheError::Serialization(format!("record for '{}' exceeds 4 GiB", entry.key));
    let meta_len = u32::try_from(meta.len()).map_err(too_large)?;
    let payload_len = u32::try_from(payload.len()).map_err(too_large)?;

    let mut buffer =
        Vec::with_capacity(HEADER_LEN + meta.len() + payload.len() + CHECKSUM_LEN);
    buffer.extend_from_slice(&RECORD_MAGIC.to_le_bytes());
    buffer.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    buffer.push(if codec.is_enabled() { FLAG_COMPRESSED } else { 0 });
    buffer.extend_from_slice(&meta_len.to_le_bytes());
    buffer.extend_from_slice(&payload_len.to_le_bytes());
    buffer.extend_from_slice(&meta);
    buffer.extend_from_slice(&payload);

    let checksum = crc32fast::hash(&buffer);
    buffer.extend_from_slice(&checksum.to_le_bytes());
    Ok(buffer)
}

/// Parse a durable record; the error string explains what is wrong with it
pub fn decode_record(data: &[u8]) -> Result<CacheEntry, String> {
    let frame = Frame::parse(data)?;
    let meta = frame.stored_meta()?;
    let expires_at = expiry_from_millis(meta.expires_at_ms)?;
    let bytes = CompressionCodec::new(frame.flags & FLAG_COMPRESSED != 0)
        .decode(frame.payload)
        .map_err(|e| e.to_string())?;

    Ok(CacheEntry::with_expiry(
        meta.key,
        CachedValue::new(meta.value_type, bytes),
        expires_at,
        meta.tags,
    ))
}

/// Validate a record and read only its metadata section
pub fn decode_meta(data: &[u8]) -> Result<RecordMeta, String> {
    let meta = Frame::parse(data)?.stored_meta()?;
    Ok(RecordMeta {
        key: meta.key,
        expires_at: expiry_from_millis(meta.expires_at_ms)?,
        tags: meta.tags.into_iter().collect(),
    })
}

/// Borrowed view of a record whose framing and checksum have been verified
struct Frame<'a> {
    flags: u8,
    meta: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, String> {
        if data.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err("record too small".to_string());
        }

        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != RECORD_MAGIC {
            return Err("invalid magic number".to_string());
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != RECORD_VERSION {
            return Err(format!("unsupported record version {}", version));
        }

        let flags = data[6];
        let meta_len = u32::from_le_bytes([data[7], data[8], data[9], data[10]]) as usize;
        let payload_len = u32::from_le_bytes([data[11], data[12], data[13], data[14]]) as usize;
        let meta_end = HEADER_LEN + meta_len;
        let body_end = meta_end + payload_len;
        if body_end + CHECKSUM_LEN != data.len() {
            return Err("truncated payload or checksum".to_string());
        }

        let expected_checksum = u32::from_le_bytes([
            data[body_end],
            data[body_end + 1],
            data[body_end + 2],
            data[body_end + 3],
        ]);
        if crc32fast::hash(&data[..body_end]) != expected_checksum {
            return Err("checksum mismatch".to_string());
        }

        Ok(Self {
            flags,
            meta: &data[HEADER_LEN..meta_end],
            payload: &data[meta_end..body_end],
        })
    }

    fn stored_meta(&self) -> Result<StoredMeta, String> {
        bincode::deserialize(self.meta).map_err(|e| format!("record decode failed: {}", e))
    }
}

fn expiry_from_millis(millis: i64) -> Result<DateTime<Utc>, String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| format!("expiry {} out of range", millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persistent::MemoryStorageDriver;
    use crate::storage::StorageDriver;
    use std::time::Duration;

    fn tier(compress: bool) -> PersistentTier {
        let driver = MemoryStorageDriver::new();
        let tree = driver.open_tree("entries").unwrap();
        PersistentTier::new(tree, CompressionCodec::new(compress), true)
    }

    fn entry(key: &str) -> CacheEntry {
        CacheEntry::new(
            key,
            CachedValue::text("payload ".repeat(64)),
            Duration::from_secs(60),
            ["g", "h"],
        )
    }

    fn raw_get(tier: &PersistentTier, key: &[u8]) -> Option<Vec<u8>> {
        tier.with_tree(|tree| Ok(tree.get(key)?)).unwrap()
    }

    fn raw_insert(tier: &PersistentTier, key: &[u8], value: &[u8]) {
        tier.with_tree(|tree| Ok(tree.insert(key, value)?)).unwrap()
    }

    fn scan(tier: &PersistentTier) -> Vec<ScannedRecord> {
        let mut records = Vec::new();
        tier.scan_metadata(|record| records.push(record)).unwrap();
        records
    }

    #[test]
    fn test_store_then_load_preserves_entry() {
        for compress in [false, true] {
            let tier = tier(compress);
            let original = entry("k");
            tier.store(&original).unwrap();

            let loaded = tier.load("k").unwrap().unwrap();
            assert_eq!(loaded, original);
        }
    }

    #[test]
    fn test_missing_key_is_absent() {
        assert_eq!(tier(false).load("nope").unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_reported_then_removed() {
        let tier = tier(false);
        tier.store(&entry("k")).unwrap();

        let mut raw = raw_get(&tier, b"k").unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        raw_insert(&tier, b"k", &raw);

        let err = tier.load("k").unwrap_err();
        assert!(matches!(err, CacheError::CorruptRecord { ref key, .. } if key == "k"));
        assert!(!tier.contains("k").unwrap());
        assert_eq!(tier.load("k").unwrap(), None);
    }

    #[test]
    fn test_flag_controls_decoding() {
        let compressed = encode_record(&entry("k"), &CompressionCodec::new(true)).unwrap();
        let plain = encode_record(&entry("k"), &CompressionCodec::disabled()).unwrap();
        assert!(compressed.len() < plain.len());
        assert_eq!(decode_record(&compressed).unwrap().value, entry("k").value);
        assert_eq!(decode_record(&plain).unwrap().value, entry("k").value);
    }

    #[test]
    fn test_decode_rejects_bad_framing() {
        assert!(decode_record(b"short").is_err());

        let mut record = encode_record(&entry("k"), &CompressionCodec::disabled()).unwrap();
        record[0] = 0;
        assert_eq!(decode_record(&record).unwrap_err(), "invalid magic number");

        let record = encode_record(&entry("k"), &CompressionCodec::disabled()).unwrap();
        assert!(decode_record(&record[..record.len() - 2]).is_err());
        assert!(decode_meta(&record[..record.len() - 2]).is_err());
    }

    #[test]
    fn test_metadata_is_readable_without_the_value() {
        let original = entry("k");
        let record = encode_record(&original, &CompressionCodec::new(true)).unwrap();

        let meta = decode_meta(&record).unwrap();
        assert_eq!(meta.key, "k");
        assert_eq!(meta.tags, original.tags);
        assert_eq!(
            meta.expires_at.timestamp_millis(),
            original.expires_at.timestamp_millis()
        );

        // A damaged payload still fails the checksum on the metadata path
        let mut damaged = record.clone();
        let payload_byte = damaged.len() - CHECKSUM_LEN - 1;
        damaged[payload_byte] ^= 0xFF;
        assert_eq!(decode_meta(&damaged).unwrap_err(), "checksum mismatch");
    }

    #[test]
    fn test_scan_separates_valid_and_corrupt() {
        let tier = tier(true);
        tier.store(&entry("a")).unwrap();
        tier.store(&entry("b")).unwrap();
        raw_insert(&tier, b"junk", b"not a record at all");

        let scanned = scan(&tier);
        let mut valid: Vec<_> = scanned
            .iter()
            .filter_map(|r| match r {
                ScannedRecord::Valid(meta) => Some(meta.key.clone()),
                _ => None,
            })
            .collect();
        let corrupt: Vec<_> = scanned
            .iter()
            .filter_map(|r| match r {
                ScannedRecord::Corrupt { raw_key, .. } => Some(raw_key.clone()),
                _ => None,
            })
            .collect();
        valid.sort();
        assert_eq!(valid, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(corrupt, vec![b"junk".to_vec()]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tier = tier(false);
        tier.store(&entry("k")).unwrap();
        assert!(tier.remove("k").unwrap());
        assert!(!tier.remove("k").unwrap());
    }

    #[test]
    fn test_closed_tier_faults_every_call() {
        let tier = tier(false);
        tier.store(&entry("k")).unwrap();

        tier.close().unwrap();
        tier.close().unwrap();
        assert!(tier.is_closed());
        assert!(matches!(tier.load("k"), Err(CacheError::StorageFault(_))));
        assert!(matches!(
            tier.store(&entry("k")),
            Err(CacheError::StorageFault(_))
        ));
        assert!(tier.scan_metadata(|_| {}).is_err());
    }
}
