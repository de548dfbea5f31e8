use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::health::HealthMetrics;
use crate::sink::counter::TaskAttemptCounterSink;
use crate::sink::logging::LoggingSink;
use crate::sink::SinkKind;
use crate::source::{RecordError, RecordSource};

/// Agent wires the record source to the configured sinks and drives the
/// flush schedule.
///
/// The run loop is the single producer context the sinks rely on: events
/// are handled serially and flushes only happen between events, so no
/// record can land in a bucket mid-flush.
pub struct Agent {
    cfg: Config,
    health: Arc<HealthMetrics>,
    sinks: Vec<SinkKind>,
    cancel: CancellationToken,
}

impl Agent {
    /// Creates a new agent, initializing health metrics and sinks.
    pub fn new(cfg: Config) -> Result<Self> {
        let health =
            Arc::new(HealthMetrics::new(&cfg.health.addr).context("creating health metrics")?);

        let mut sinks = Vec::with_capacity(2);
        if cfg.sinks.counter.enabled {
            sinks.push(SinkKind::Counter(TaskAttemptCounterSink::new(
                cfg.sinks.counter.clone(),
                cfg.service.clone(),
                Some(Arc::clone(&health)),
            )));
        }
        if cfg.sinks.logging.enabled {
            sinks.push(SinkKind::Logging(LoggingSink::new()));
        }

        Ok(Self {
            cfg,
            health,
            sinks,
            cancel: CancellationToken::new(),
        })
    }

    /// Token observed by the run loop; cancel it to stop the agent.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the agent until the source is exhausted or the token fires.
    ///
    /// Always attempts the final flush and sink uninstall before returning;
    /// a final-flush failure is reported after uninstall completes.
    pub async fn run(&mut self) -> Result<()> {
        self.health
            .start()
            .await
            .context("starting health metrics server")?;

        for sink in &mut self.sinks {
            sink.on_install()
                .with_context(|| format!("installing sink {}", sink.name()))?;
            info!(sink = sink.name(), "sink installed");
        }

        let mut source = RecordSource::open(&self.cfg.source.path)
            .await
            .context("opening record source")?;

        let cancel = self.cancel.clone();
        let mut ticker = tokio::time::interval(self.cfg.sinks.counter.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Consume the immediate first tick so the first flush waits a full
        // interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("agent cancelled, draining");
                    break;
                }

                _ = ticker.tick() => {
                    // A failed periodic flush leaves the aggregation state in
                    // place; the next tick retries it (at-least-once).
                    for sink in &mut self.sinks {
                        if let Err(e) = sink.flush().await {
                            error!(sink = sink.name(), error = %e, "periodic flush failed");
                        }
                    }
                }

                next = source.next() => match next {
                    Some(Ok(event)) => {
                        self.health.events_received.inc();
                        for sink in &mut self.sinks {
                            sink.handle_event(&event);
                        }
                    }
                    Some(Err(RecordError::Malformed(e))) => {
                        self.health.events_dropped.inc();
                        warn!(error = %e, "dropping malformed record");
                    }
                    Some(Err(RecordError::Io(e))) => {
                        return Err(e).context("reading record source");
                    }
                    None => {
                        info!("record source exhausted");
                        break;
                    }
                },
            }
        }

        // Final flush; keep going on failure so every sink gets uninstalled.
        let mut flush_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush().await {
                error!(sink = sink.name(), error = %e, "final flush failed");
                flush_err.get_or_insert(e);
            }
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.on_uninstall() {
                warn!(sink = sink.name(), error = %e, "sink uninstall failed");
            }
        }

        self.health.stop().await?;

        match flush_err {
            Some(e) => Err(e.context("final flush")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging_only_config(path: &str) -> Config {
        let mut cfg = Config::default();
        cfg.source.path = path.to_string();
        cfg.sinks.counter.enabled = false;
        cfg.sinks.logging.enabled = true;
        cfg.health.addr = "127.0.0.1:0".to_string();
        cfg
    }

    #[tokio::test]
    async fn test_run_to_end_of_stream() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"job_id":"job_1","task_status":"FAILED","end_time_ms":36015000}}"#
        )
        .unwrap();
        writeln!(file, "not json at all").unwrap();
        file.flush().unwrap();

        let cfg = logging_only_config(file.path().to_str().unwrap());
        let mut agent = Agent::new(cfg).unwrap();
        agent.run().await.unwrap();

        assert_eq!(agent.health.events_received.get() as u64, 1);
        assert_eq!(agent.health.events_dropped.get() as u64, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let cfg = logging_only_config("-");
        let mut agent = Agent::new(cfg).unwrap();
        let cancel = agent.cancel_token();

        let run = tokio::spawn(async move { agent.run().await });
        cancel.cancel();
        run.await.unwrap().unwrap();
    }
}
