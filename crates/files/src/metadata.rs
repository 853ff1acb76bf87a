//! In-memory index from stored-file key to the content type(s) recorded at upload.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Concurrent map from key to content-type header values.
///
/// Writers (`put`, `remove`, `clear`) are exclusive; any number of `get`s may run together. The
/// map only ever holds plain owned values, so a panic while a guard was held cannot leave it
/// half-updated and a poisoned lock is simply recovered.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `content_types` for `key`, replacing any earlier entry.
    pub fn put(&self, key: impl Into<String>, content_types: Vec<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), content_types);
    }

    /// Returns a copy of the content types recorded for `key`.
    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Removes and returns the entry for `key`.
    pub fn remove(&self, key: &str) -> Option<Vec<String>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
