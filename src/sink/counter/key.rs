use crate::event::{TagSet, TaskAttemptEvent};

/// Milliseconds in one aggregation bucket.
pub const MINUTE_MS: i64 = 60_000;

/// Identity of one counter bucket: the full tag set plus the attempt
/// end time truncated to the start of its minute.
///
/// Equality and hashing are structural over both parts, so two records
/// agree on a bucket iff all six tags match and their end times fall in
/// the same minute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub tags: TagSet,
    /// Bucket start, milliseconds since epoch, always a multiple of [`MINUTE_MS`].
    pub bucket_ms: i64,
}

impl CounterKey {
    /// Derives the bucket key for an event.
    pub fn from_event(event: &TaskAttemptEvent) -> Self {
        Self {
            tags: event.tag_set(),
            bucket_ms: truncate_to_minute(event.end_time_ms),
        }
    }
}

/// Truncates a millisecond timestamp down to the start of its minute.
///
/// `rem_euclid` keeps the truncation downward for pre-epoch timestamps
/// as well (-1ms belongs to the minute starting at -60000).
pub fn truncate_to_minute(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(MINUTE_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TaskStatus;
    use std::collections::HashMap;

    fn make_event(end_time_ms: i64) -> TaskAttemptEvent {
        TaskAttemptEvent {
            site: Some("prod".to_string()),
            norm_job_name: Some("etl-hourly".to_string()),
            rack: Some("r12".to_string()),
            hostname: Some("dn-04".to_string()),
            job_id: Some("job_202011_0007".to_string()),
            task_type: Some("MAP".to_string()),
            task_status: TaskStatus::Succeeded,
            end_time_ms,
        }
    }

    #[test]
    fn test_truncate_to_minute() {
        // 10:00:15.500 truncates to 10:00:00.000.
        assert_eq!(truncate_to_minute(36_015_500), 36_000_000);
        assert_eq!(truncate_to_minute(36_000_000), 36_000_000);
        assert_eq!(truncate_to_minute(36_059_999), 36_000_000);
        assert_eq!(truncate_to_minute(36_060_000), 36_060_000);
        assert_eq!(truncate_to_minute(0), 0);
    }

    #[test]
    fn test_truncate_to_minute_pre_epoch() {
        assert_eq!(truncate_to_minute(-1), -60_000);
        assert_eq!(truncate_to_minute(-60_000), -60_000);
        assert_eq!(truncate_to_minute(-59_999), -60_000);
    }

    #[test]
    fn test_keys_one_millisecond_across_boundary_differ() {
        let a = CounterKey::from_event(&make_event(36_059_999));
        let b = CounterKey::from_event(&make_event(36_060_000));
        assert_ne!(a, b);
        assert_eq!(a.bucket_ms + MINUTE_MS, b.bucket_ms);
    }

    #[test]
    fn test_keys_within_same_minute_collide() {
        let a = CounterKey::from_event(&make_event(36_000_001));
        let b = CounterKey::from_event(&make_event(36_059_999));
        assert_eq!(a, b);
    }

    #[test]
    fn test_counter_key_as_map_key() {
        let mut map: HashMap<CounterKey, u32> = HashMap::new();
        let key = CounterKey::from_event(&make_event(36_015_500));
        map.insert(key.clone(), 42);
        assert_eq!(map.get(&key), Some(&42));

        // Equal key built from a different event instance hits the same slot.
        let same = CounterKey::from_event(&make_event(36_030_000));
        assert_eq!(map.get(&same), Some(&42));
    }

    #[test]
    fn test_differing_tag_splits_bucket() {
        let mut other = make_event(36_015_500);
        other.task_type = Some("REDUCE".to_string());

        let a = CounterKey::from_event(&make_event(36_015_500));
        let b = CounterKey::from_event(&other);
        assert_ne!(a, b);
    }
}
