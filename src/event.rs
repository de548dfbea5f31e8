use serde::Deserialize;

/// Sentinel stored for tag values missing from an inbound record.
///
/// Absent tags are permitted on the wire; normalizing them to a fixed
/// sentinel keeps bucket identity well-defined without optional fields
/// in the key.
pub const UNKNOWN_TAG: &str = "unknown";

/// Terminal status classification of a task attempt.
///
/// Only `Failed` and `Killed` affect counter breakdowns; every other
/// classification (including ones this agent does not know about) counts
/// toward the bucket total only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Killed,
    #[serde(other)]
    Other,
}

impl TaskStatus {
    /// Returns the canonical log/metric label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Other => "other",
        }
    }
}

/// Names of the tags that make up a counter bucket identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobTag {
    Site,
    NormJobName,
    Rack,
    Hostname,
    JobId,
    TaskType,
}

impl JobTag {
    /// Returns the canonical wire/storage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::NormJobName => "norm_job_name",
            Self::Rack => "rack",
            Self::Hostname => "hostname",
            Self::JobId => "job_id",
            Self::TaskType => "task_type",
        }
    }

    /// All tags in canonical order.
    pub const fn all() -> [JobTag; 6] {
        [
            Self::Site,
            Self::NormJobName,
            Self::Rack,
            Self::Hostname,
            Self::JobId,
            Self::TaskType,
        ]
    }
}

/// The fixed set of tag values identifying a counter bucket.
///
/// Structural equality and the derived hash give map-key semantics; absent
/// values are normalized to [`UNKNOWN_TAG`] at construction so two records
/// missing the same tag land in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSet {
    pub site: String,
    pub norm_job_name: String,
    pub rack: String,
    pub hostname: String,
    pub job_id: String,
    pub task_type: String,
}

impl TagSet {
    /// Builds a tag set from possibly-absent values.
    pub fn from_parts(
        site: Option<&str>,
        norm_job_name: Option<&str>,
        rack: Option<&str>,
        hostname: Option<&str>,
        job_id: Option<&str>,
        task_type: Option<&str>,
    ) -> Self {
        Self {
            site: normalize_tag(site),
            norm_job_name: normalize_tag(norm_job_name),
            rack: normalize_tag(rack),
            hostname: normalize_tag(hostname),
            job_id: normalize_tag(job_id),
            task_type: normalize_tag(task_type),
        }
    }

    /// Returns the value for a tag name.
    pub fn get(&self, tag: JobTag) -> &str {
        match tag {
            JobTag::Site => &self.site,
            JobTag::NormJobName => &self.norm_job_name,
            JobTag::Rack => &self.rack,
            JobTag::Hostname => &self.hostname,
            JobTag::JobId => &self.job_id,
            JobTag::TaskType => &self.task_type,
        }
    }

    /// Iterates (name, value) pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (JobTag, &str)> {
        JobTag::all().into_iter().map(move |tag| (tag, self.get(tag)))
    }
}

/// Normalizes an optional tag value, mapping absent and empty to the sentinel.
fn normalize_tag(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_TAG.to_string(),
    }
}

/// One task-attempt execution record as read from the inbound stream.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskAttemptEvent {
    #[serde(default)]
    pub site: Option<String>,

    #[serde(default)]
    pub norm_job_name: Option<String>,

    #[serde(default)]
    pub rack: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub job_id: Option<String>,

    #[serde(default)]
    pub task_type: Option<String>,

    /// Terminal status of the attempt.
    pub task_status: TaskStatus,

    /// Attempt completion time, milliseconds since epoch.
    pub end_time_ms: i64,
}

impl TaskAttemptEvent {
    /// Returns the normalized tag set for bucket identity.
    pub fn tag_set(&self) -> TagSet {
        TagSet::from_parts(
            self.site.as_deref(),
            self.norm_job_name.as_deref(),
            self.rack.as_deref(),
            self.hostname.as_deref(),
            self.job_id.as_deref(),
            self.task_type.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_deserialize() {
        let status: TaskStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(status, TaskStatus::Failed);

        let status: TaskStatus = serde_json::from_str("\"KILLED\"").unwrap();
        assert_eq!(status, TaskStatus::Killed);

        let status: TaskStatus = serde_json::from_str("\"SUCCEEDED\"").unwrap();
        assert_eq!(status, TaskStatus::Succeeded);
    }

    #[test]
    fn test_task_status_unknown_maps_to_other() {
        let status: TaskStatus = serde_json::from_str("\"TIPFAILED\"").unwrap();
        assert_eq!(status, TaskStatus::Other);
    }

    #[test]
    fn test_tag_set_normalizes_absent_and_empty() {
        let tags = TagSet::from_parts(Some("prod"), None, Some(""), Some("h1"), None, None);
        assert_eq!(tags.site, "prod");
        assert_eq!(tags.norm_job_name, UNKNOWN_TAG);
        assert_eq!(tags.rack, UNKNOWN_TAG);
        assert_eq!(tags.hostname, "h1");
        assert_eq!(tags.job_id, UNKNOWN_TAG);
        assert_eq!(tags.task_type, UNKNOWN_TAG);
    }

    #[test]
    fn test_tag_set_equality_ignores_source_shape() {
        // A missing tag and an empty tag normalize to the same bucket identity.
        let a = TagSet::from_parts(Some("prod"), None, None, None, None, Some("MAP"));
        let b = TagSet::from_parts(Some("prod"), Some(""), None, None, None, Some("MAP"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_tag_set_iter_order() {
        let tags = TagSet::from_parts(
            Some("a"),
            Some("b"),
            Some("c"),
            Some("d"),
            Some("e"),
            Some("f"),
        );
        let names: Vec<&str> = tags.iter().map(|(tag, _)| tag.as_str()).collect();
        assert_eq!(
            names,
            ["site", "norm_job_name", "rack", "hostname", "job_id", "task_type"]
        );
    }

    #[test]
    fn test_event_deserialize_with_missing_tags() {
        let event: TaskAttemptEvent = serde_json::from_str(
            r#"{"site":"prod","job_id":"job_1","task_status":"FAILED","end_time_ms":1700000015500}"#,
        )
        .unwrap();
        assert_eq!(event.task_status, TaskStatus::Failed);
        assert_eq!(event.end_time_ms, 1_700_000_015_500);

        let tags = event.tag_set();
        assert_eq!(tags.site, "prod");
        assert_eq!(tags.job_id, "job_1");
        assert_eq!(tags.rack, UNKNOWN_TAG);
    }
}
