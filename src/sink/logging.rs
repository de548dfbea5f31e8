use anyhow::Result;
use chrono::{TimeZone, Utc};
use tracing::info;

use crate::event::TaskAttemptEvent;

use super::Sink;

/// Passthrough sink that logs each event and discards it.
///
/// Keeps no state; useful as a diagnostic endpoint or as a placeholder
/// while a real downstream is not yet wired up.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl LoggingSink {
    /// Creates a new logging sink.
    pub fn new() -> Self {
        Self
    }
}

impl Sink for LoggingSink {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_install(&mut self) -> Result<()> {
        info!("logging sink installed, nothing to initialize");
        Ok(())
    }

    fn on_uninstall(&mut self) -> Result<()> {
        info!("logging sink uninstalled, nothing to release");
        Ok(())
    }

    fn handle_event(&mut self, event: &TaskAttemptEvent) {
        info!(
            job_id = event.job_id.as_deref().unwrap_or_default(),
            task_type = event.task_type.as_deref().unwrap_or_default(),
            status = event.task_status.as_str(),
            completed = %format_end_time(event.end_time_ms),
            "received task attempt",
        );
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Formats a millisecond timestamp for the log line, falling back to the
/// raw value when it does not map to a valid instant.
fn format_end_time(ts_ms: i64) -> String {
    match Utc.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => ts_ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TaskStatus;

    #[test]
    fn test_format_end_time() {
        assert_eq!(format_end_time(0), "1970-01-01 00:00:00.000");
        assert_eq!(format_end_time(36_015_500), "1970-01-01 10:00:15.500");
    }

    #[tokio::test]
    async fn test_lifecycle_and_events_never_fail() {
        let mut sink = LoggingSink::new();
        sink.on_install().unwrap();

        sink.handle_event(&TaskAttemptEvent {
            site: None,
            norm_job_name: None,
            rack: None,
            hostname: None,
            job_id: Some("job_1".to_string()),
            task_type: Some("MAP".to_string()),
            task_status: TaskStatus::Killed,
            end_time_ms: 1_700_000_000_000,
        });

        sink.flush().await.unwrap();
        sink.on_uninstall().unwrap();
    }
}
