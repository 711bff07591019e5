use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ChannelEntry, CheckOutcome};
use crate::services::normalizer::NameNormalizer;

/// Normalized name -> candidate entries, both in insertion (scan) order.
///
/// Entries are shared immutable snapshots; updating a source builds a new index.
#[derive(Debug, Clone, Default)]
pub struct ChannelIndex {
    keys: Vec<String>,
    buckets: HashMap<String, Vec<Arc<ChannelEntry>>>,
    entries: usize,
}

impl ChannelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.buckets.clear();
        self.entries = 0;
    }

    /// Index an entry under its normalized name. Returns false for names that
    /// normalize to nothing.
    pub fn add(&mut self, entry: ChannelEntry) -> bool {
        self.add_shared(Arc::new(entry))
    }

    pub fn add_shared(&mut self, entry: Arc<ChannelEntry>) -> bool {
        let key = NameNormalizer::normalize(&entry.name);
        if key.is_empty() {
            return false;
        }

        match self.buckets.get_mut(&key) {
            Some(bucket) => bucket.push(entry),
            None => {
                self.keys.push(key.clone());
                self.buckets.insert(key, vec![entry]);
            }
        }
        self.entries += 1;
        true
    }

    pub fn candidates_for(&self, key: &str) -> &[Arc<ChannelEntry>] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every entry, grouped by key in key order
    pub fn entries(&self) -> impl Iterator<Item = &Arc<ChannelEntry>> {
        self.keys.iter().flat_map(|key| self.candidates_for(key).iter())
    }

    /// Keys in the order they were first seen
    pub fn all_keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Entries scanned from `source`
    pub fn source_len(&self, source: &str) -> usize {
        self.buckets
            .values()
            .flatten()
            .filter(|e| e.source == source)
            .count()
    }

    /// New index with every entry of `source` replaced by `entries`.
    ///
    /// Other sources keep their relative order; the new entries go last.
    pub fn replace_source(&self, source: &str, entries: impl IntoIterator<Item = Arc<ChannelEntry>>) -> Self {
        let mut next = ChannelIndex::new();
        for key in &self.keys {
            for entry in self.candidates_for(key) {
                if entry.source != source {
                    next.add_shared(Arc::clone(entry));
                }
            }
        }
        for entry in entries {
            next.add_shared(entry);
        }
        next
    }

    /// New index where every entry with a recorded outcome carries it.
    ///
    /// Outcomes are keyed by `(source, url)`; ordering is unchanged.
    pub fn with_outcomes(&self, outcomes: &HashMap<(String, String), CheckOutcome>) -> Self {
        let mut next = ChannelIndex::new();
        for entry in self.entries() {
            let key = (entry.source.clone(), entry.url_str().to_string());
            let shared = match outcomes.get(&key) {
                Some(outcome) => {
                    let mut checked = ChannelEntry::clone(entry);
                    checked.apply_check(outcome);
                    Arc::new(checked)
                }
                None => Arc::clone(entry),
            };
            next.add_shared(shared);
        }
        next
    }
}
