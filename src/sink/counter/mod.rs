pub mod aggregate;
pub mod flush;
pub mod key;
pub mod service;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{CounterSinkConfig, ServiceConfig};
use crate::event::TaskAttemptEvent;
use crate::health::HealthMetrics;
use crate::sink::Sink;

use self::aggregate::Aggregator;
use self::flush::submit_all;
use self::service::{EntityService, HttpEntityService};

/// Sink that aggregates task attempts into per-minute counters and flushes
/// them to the entity storage service in bounded batches.
///
/// Delivery is at-least-once: a failed flush leaves the aggregation map
/// intact, so the next flush resubmits every bucket including any batches
/// that already landed before the failure. Duplicate suppression is the
/// store's concern.
pub struct TaskAttemptCounterSink {
    cfg: CounterSinkConfig,
    service_cfg: ServiceConfig,
    aggregator: Aggregator,
    health: Option<Arc<HealthMetrics>>,
}

impl TaskAttemptCounterSink {
    /// Creates a new counter sink.
    pub fn new(
        cfg: CounterSinkConfig,
        service_cfg: ServiceConfig,
        health: Option<Arc<HealthMetrics>>,
    ) -> Self {
        Self {
            cfg,
            service_cfg,
            aggregator: Aggregator::new(),
            health,
        }
    }

    /// Read access to the accumulated buckets.
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Drains all accumulated buckets into the given service.
    ///
    /// Clears the aggregation map only after every batch submission
    /// succeeded; on failure the map is untouched and the error propagates.
    pub async fn flush_to<S: EntityService>(&mut self, service: &S) -> Result<()> {
        info!(
            buckets = self.aggregator.len(),
            "start flushing task attempt counters",
        );

        let stats = submit_all(&self.aggregator, service, self.cfg.batch_size).await?;
        self.aggregator.clear();

        if let Some(health) = &self.health {
            health.buckets_tracked.set(0.0);
        }

        info!(
            rows = stats.rows,
            batches = stats.batches,
            "end flushing task attempt counters",
        );

        Ok(())
    }
}

impl Sink for TaskAttemptCounterSink {
    fn name(&self) -> &str {
        "task_attempt_counter"
    }

    fn on_install(&mut self) -> Result<()> {
        info!(
            batch_size = self.cfg.batch_size,
            flush_interval = ?self.cfg.flush_interval,
            "task attempt counter sink installed",
        );
        Ok(())
    }

    fn on_uninstall(&mut self) -> Result<()> {
        info!("task attempt counter sink uninstalled");
        Ok(())
    }

    fn handle_event(&mut self, event: &TaskAttemptEvent) {
        self.aggregator.record(event);

        if let Some(health) = &self.health {
            health.buckets_tracked.set(self.aggregator.len() as f64);
        }
    }

    /// Acquires a service client, submits all buckets, and releases the
    /// client on every exit path. A close failure after a successful submit
    /// propagates; a close failure after a submit failure is logged so it
    /// never masks the transmission error.
    async fn flush(&mut self) -> Result<()> {
        let started = Instant::now();

        let service = HttpEntityService::connect(&self.service_cfg, self.health.clone())
            .context("connecting to entity service")?;

        let submitted = self.flush_to(&service).await;
        let closed = service.close().await;

        if let Some(health) = &self.health {
            health.flush_duration.observe(started.elapsed().as_secs_f64());
            if submitted.is_err() {
                health.flush_errors.inc();
            } else {
                health.flushes_total.inc();
            }
        }

        match submitted {
            Ok(()) => closed.context("closing entity service client"),
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "entity service close failed after flush error");
                }
                Err(e)
            }
        }
    }
}
