use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use super::aggregate::{Aggregator, CounterValue};
use super::key::CounterKey;
use super::service::EntityService;

/// Flush-time projection of one bucket into a transmissible record.
///
/// Built fresh for every flush, never mutated afterwards, and not retained
/// once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskAttemptCounterRow {
    /// Bucket tags keyed by canonical tag name.
    pub tags: BTreeMap<&'static str, String>,
    /// Bucket start, milliseconds since epoch.
    pub timestamp_ms: i64,
    pub total_count: u64,
    pub failed_count: u64,
    pub killed_count: u64,
}

impl TaskAttemptCounterRow {
    /// Projects one (key, counter) entry into a row.
    pub fn from_entry(key: &CounterKey, value: &CounterValue) -> Self {
        let tags = key
            .tags
            .iter()
            .map(|(tag, v)| (tag.as_str(), v.to_string()))
            .collect();

        Self {
            tags,
            timestamp_ms: key.bucket_ms,
            total_count: value.total,
            failed_count: value.failed,
            killed_count: value.killed,
        }
    }
}

/// Outcome of one submit pass over the aggregation map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub rows: usize,
    pub batches: usize,
}

/// Submits every bucket currently in the aggregator to the service in
/// batches of at most `batch_size` rows.
///
/// Buckets are visited in map order (arbitrary); each bucket is projected
/// into exactly one row in exactly one batch. The remainder batch after the
/// loop is skipped when empty, so an empty aggregator performs zero
/// submissions. The aggregator itself is left untouched; the caller clears
/// it only after this returns `Ok`.
///
/// A failed submission propagates immediately with the remaining buckets
/// unsent, which together with the caller's clear-on-success rule yields
/// at-least-once delivery on retry.
pub async fn submit_all<S: EntityService>(
    aggregator: &Aggregator,
    service: &S,
    batch_size: usize,
) -> Result<FlushStats> {
    let mut stats = FlushStats::default();
    let mut batch: Vec<TaskAttemptCounterRow> =
        Vec::with_capacity(batch_size.min(aggregator.len()));

    for (key, value) in aggregator.iter() {
        batch.push(TaskAttemptCounterRow::from_entry(key, value));

        if batch.len() >= batch_size {
            debug!(rows = batch.len(), "submitting counter batch");
            service.create_batch(&batch).await?;
            stats.rows += batch.len();
            stats.batches += 1;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        debug!(rows = batch.len(), "submitting final counter batch");
        service.create_batch(&batch).await?;
        stats.rows += batch.len();
        stats.batches += 1;
    }

    Ok(stats)
}
