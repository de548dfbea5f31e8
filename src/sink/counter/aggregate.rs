use std::collections::HashMap;

use crate::event::{TaskAttemptEvent, TaskStatus};

use super::key::CounterKey;

/// Accumulated counts for one bucket.
///
/// `total` counts every record seen for the key; `failed` and `killed`
/// count the matching status subsets, so `failed + killed <= total` holds
/// throughout accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValue {
    pub total: u64,
    pub failed: u64,
    pub killed: u64,
}

/// In-memory accumulation of task-attempt counters between flushes.
///
/// Single-writer by contract: `record` and `clear` take `&mut self` and the
/// map is never shared. Callers that want parallel ingestion must serialize
/// access externally; there is no internal locking.
#[derive(Debug, Default)]
pub struct Aggregator {
    counters: HashMap<CounterKey, CounterValue>,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    /// Folds one event into its bucket, creating the bucket on first sight.
    ///
    /// Total increments unconditionally; failed/killed increment on the
    /// matching classification. Never fails and performs no I/O.
    pub fn record(&mut self, event: &TaskAttemptEvent) {
        let key = CounterKey::from_event(event);
        let value = self.counters.entry(key).or_default();

        match event.task_status {
            TaskStatus::Failed => value.failed += 1,
            TaskStatus::Killed => value.killed += 1,
            _ => {}
        }
        value.total += 1;
    }

    /// Number of buckets currently tracked.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True when no buckets are tracked.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Returns the counter for a bucket, if present.
    pub fn get(&self, key: &CounterKey) -> Option<&CounterValue> {
        self.counters.get(key)
    }

    /// Iterates all buckets in arbitrary order.
    ///
    /// Bucket identity lives entirely in the key; ordering across buckets
    /// carries no meaning.
    pub fn iter(&self) -> impl Iterator<Item = (&CounterKey, &CounterValue)> {
        self.counters.iter()
    }

    /// Drops all buckets. Called after a fully successful flush.
    pub fn clear(&mut self) {
        self.counters.clear();
    }
}
