//! Metric names, tag sets and the metrics capability.
//!
//! Every emission against a root reuses the same [`MetricsTagSet`]; the
//! pipeline builds one for the source root and one for the target root when
//! it is constructed and never rebuilds them per object.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::types::StoragePath;

/// Incremented for each object entering the read stage (source tags).
pub const OBJECTS_INCOMING: &str = "objects.incoming";
/// Incremented for each successful write (target tags).
pub const OBJECTS_OUTGOING: &str = "objects.outgoing";
/// Byte length of each successfully written object (source tags).
pub const OBJECTS_SIZE: &str = "objects.size";
/// Incremented for each successful source deletion (source tags).
pub const OBJECTS_DELETED: &str = "objects.deleted";

pub const TAG_BUCKET: &str = "bucket";
pub const TAG_KEY: &str = "key";
pub const TAG_STREAM_KIND: &str = "arcane.sneaksanddata.com/kind";
pub const TAG_STREAM_ID: &str = "arcane.sneaksanddata.com/stream_id";

/// Sorted, deduplicated dimension set shared by reference.
///
/// Cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricsTagSet(Arc<BTreeMap<String, String>>);

impl MetricsTagSet {
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        Self(Arc::new(tags))
    }

    /// Tag set for a root path and a stream identity.
    ///
    /// The stream kind is normalised to snake_case.
    pub fn for_root(path: &StoragePath, stream_kind: &str, stream_id: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(TAG_BUCKET.to_string(), path.bucket().to_string());
        tags.insert(TAG_KEY.to_string(), path.key().to_string());
        tags.insert(
            TAG_STREAM_KIND.to_string(),
            camel_case_to_snake_case(stream_kind),
        );
        tags.insert(TAG_STREAM_ID.to_string(), stream_id.to_string());
        Self::new(tags)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// `BlobStorageStream` → `blob_storage_stream`, `S3Stream` → `s3_stream`.
pub fn camel_case_to_snake_case(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut snake = String::with_capacity(value.len() + 4);

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !snake.ends_with('_') {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(*c);
        }
    }

    snake
}

/// Fire-and-forget counter sink.
///
/// Implementations must tolerate concurrent calls from every stage worker.
pub trait MetricsService: Send + Sync {
    fn increment(&self, name: &str, tags: &MetricsTagSet) {
        self.count(name, 1, tags);
    }

    fn count(&self, name: &str, value: u64, tags: &MetricsTagSet);
}

/// In-process counters keyed by `(name, tag set)`.
///
/// Every emission is also logged at trace level.
#[derive(Debug, Default)]
pub struct InMemoryMetricsService {
    counters: Mutex<HashMap<(String, MetricsTagSet), u64>>,
}

impl InMemoryMetricsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of a counter across every tag set it was emitted with.
    pub fn total(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn get(&self, name: &str, tags: &MetricsTagSet) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .get(&(name.to_string(), tags.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<(String, MetricsTagSet, u64)> {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<_> = counters
            .iter()
            .map(|((name, tags), value)| (name.clone(), tags.clone(), *value))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}

impl MetricsService for InMemoryMetricsService {
    fn count(&self, name: &str, value: u64, tags: &MetricsTagSet) {
        trace!(
            metric = name,
            value = value,
            bucket = tags.get(TAG_BUCKET),
            key = tags.get(TAG_KEY),
            stream_id = tags.get(TAG_STREAM_ID),
            "metric emitted."
        );

        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters.entry((name.to_string(), tags.clone())).or_insert(0) += value;
    }
}
