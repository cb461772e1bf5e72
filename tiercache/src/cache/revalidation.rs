// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Tag index driving group invalidation
//!
//! Keeps two maps in step under one lock: tag -> keys for revalidation and
//! key -> tags so an overwrite or removal can drop every stale association
//! without scanning all tags.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Default)]
struct IndexInner {
    keys_by_tag: HashMap<String, HashSet<String>>,
    tags_by_key: HashMap<String, BTreeSet<String>>,
}

impl IndexInner {
    fn link(&mut self, key: &str, tag: &str) {
        self.keys_by_tag
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
        self.tags_by_key
            .entry(key.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    fn unlink(&mut self, key: &str, tag: &str) {
        if let Some(keys) = self.keys_by_tag.get_mut(tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_by_tag.remove(tag);
            }
        }
        if let Some(tags) = self.tags_by_key.get_mut(key) {
            tags.remove(tag);
            if tags.is_empty() {
                self.tags_by_key.remove(key);
            }
        }
    }
}

/// Secondary index from tag to the keys currently carrying it
#[derive(Debug, Default)]
pub struct RevalidationIndex {
    inner: RwLock<IndexInner>,
}

impl RevalidationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under each tag
    pub fn tag<'a, I>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut inner = self.inner.write();
        for tag in tags {
            inner.link(key, tag);
        }
    }

    /// Remove `key` from each tag's set
    pub fn untag<'a, I>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut inner = self.inner.write();
        for tag in tags {
            inner.unlink(key, tag);
        }
    }

    /// Make `tags` the complete tag set of `key` in one step
    pub fn replace(&self, key: &str, tags: &BTreeSet<String>) {
        let mut inner = self.inner.write();
        let previous = inner.tags_by_key.get(key).cloned().unwrap_or_default();
        for stale in previous.difference(tags) {
            inner.unlink(key, stale);
        }
        for tag in tags.difference(&previous) {
            inner.link(key, tag);
        }
    }

    /// Drop `key` from every tag it participates in, returning those tags
    pub fn remove_key(&self, key: &str) -> BTreeSet<String> {
        let mut inner = self.inner.write();
        let tags = inner.tags_by_key.remove(key).unwrap_or_default();
        for tag in &tags {
            if let Some(keys) = inner.keys_by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    inner.keys_by_tag.remove(tag);
                }
            }
        }
        tags
    }

    /// Snapshot of the keys registered under `tag`
    pub fn keys_for(&self, tag: &str) -> Vec<String> {
        self.inner
            .read()
            .keys_by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tags_of(&self, key: &str) -> BTreeSet<String> {
        self.inner
            .read()
            .tags_by_key
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_tag(&self, key: &str, tag: &str) -> bool {
        self.inner
            .read()
            .tags_by_key
            .get(key)
            .is_some_and(|tags| tags.contains(tag))
    }

    pub fn tag_count(&self) -> usize {
        self.inner.read().keys_by_tag.len()
    }

    pub fn tagged_key_count(&self) -> usize {
        self.inner.read().tags_by_key.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.keys_by_tag.clear();
        inner.tags_by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_and_lookup() {
        let index = RevalidationIndex::new();
        index.tag("a", &tags(&["g", "h"]));
        index.tag("b", &tags(&["g"]));

        let mut keys = index.keys_for("g");
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(index.keys_for("h"), vec!["a".to_string()]);
        assert!(index.keys_for("missing").is_empty());
        assert!(index.has_tag("a", "h"));
        assert!(!index.has_tag("b", "h"));
    }

    #[test]
    fn test_replace_drops_stale_tags() {
        let index = RevalidationIndex::new();
        index.replace("a", &tags(&["old", "kept"]));
        index.replace("a", &tags(&["kept", "new"]));

        assert!(index.keys_for("old").is_empty());
        assert_eq!(index.keys_for("kept"), vec!["a".to_string()]);
        assert_eq!(index.keys_for("new"), vec!["a".to_string()]);
        assert_eq!(index.tags_of("a"), tags(&["kept", "new"]));
        assert_eq!(index.tag_count(), 2);
    }

    #[test]
    fn test_remove_key_cleans_every_tag() {
        let index = RevalidationIndex::new();
        index.tag("a", &tags(&["g", "h"]));
        index.tag("b", &tags(&["g"]));

        let removed = index.remove_key("a");
        assert_eq!(removed, tags(&["g", "h"]));
        assert_eq!(index.keys_for("g"), vec!["b".to_string()]);
        assert_eq!(index.tag_count(), 1);
        assert_eq!(index.tagged_key_count(), 1);

        assert!(index.remove_key("a").is_empty());
    }

    #[test]
    fn test_untag_subset() {
        let index = RevalidationIndex::new();
        index.tag("a", &tags(&["g", "h"]));
        index.untag("a", &tags(&["g"]));
        assert_eq!(index.tags_of("a"), tags(&["h"]));

        index.untag("a", &tags(&["h"]));
        assert_eq!(index.tagged_key_count(), 0);
    }
}
