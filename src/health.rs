use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Prometheus metrics for agent health and observability.
///
/// All metrics use the "taskwatch" namespace.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Total task-attempt records read from the source.
    pub events_received: Counter,
    /// Total records dropped as malformed.
    pub events_dropped: Counter,
    /// Counter buckets currently accumulated.
    pub buckets_tracked: Gauge,
    /// Total successful counter flushes.
    pub flushes_total: Counter,
    /// Total failed counter flushes.
    pub flush_errors: Counter,
    /// Counter flush duration.
    pub flush_duration: Histogram,
    /// Rows per entity service batch submission.
    pub service_batch_rows: Histogram,
    /// Entity service batch submission duration.
    pub service_batch_duration: Histogram,
    /// Total failed entity service batch submissions.
    pub service_batch_errors: Counter,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let events_received = Counter::with_opts(
            Opts::new(
                "events_received_total",
                "Total task-attempt records read from the source.",
            )
            .namespace("taskwatch"),
        )?;
        let events_dropped = Counter::with_opts(
            Opts::new(
                "events_dropped_total",
                "Total records dropped as malformed.",
            )
            .namespace("taskwatch"),
        )?;
        let buckets_tracked = Gauge::with_opts(
            Opts::new(
                "buckets_tracked",
                "Counter buckets currently accumulated.",
            )
            .namespace("taskwatch"),
        )?;
        let flushes_total = Counter::with_opts(
            Opts::new("flushes_total", "Total successful counter flushes.")
                .namespace("taskwatch"),
        )?;
        let flush_errors = Counter::with_opts(
            Opts::new("flush_errors_total", "Total failed counter flushes.")
                .namespace("taskwatch"),
        )?;
        let flush_duration = Histogram::with_opts(
            HistogramOpts::new("flush_duration_seconds", "Counter flush duration.")
                .namespace("taskwatch")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        let service_batch_rows = Histogram::with_opts(
            HistogramOpts::new(
                "service_batch_rows",
                "Rows per entity service batch submission.",
            )
            .namespace("taskwatch")
            .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
        )?;
        let service_batch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "service_batch_duration_seconds",
                "Entity service batch submission duration.",
            )
            .namespace("taskwatch")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        let service_batch_errors = Counter::with_opts(
            Opts::new(
                "service_batch_errors_total",
                "Total failed entity service batch submissions.",
            )
            .namespace("taskwatch"),
        )?;

        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(buckets_tracked.clone()))?;
        registry.register(Box::new(flushes_total.clone()))?;
        registry.register(Box::new(flush_errors.clone()))?;
        registry.register(Box::new(flush_duration.clone()))?;
        registry.register(Box::new(service_batch_rows.clone()))?;
        registry.register(Box::new(service_batch_duration.clone()))?;
        registry.register(Box::new(service_batch_errors.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            events_received,
            events_dropped,
            buckets_tracked,
            flushes_total,
            flush_errors,
            flush_duration,
            service_batch_rows,
            service_batch_duration,
            service_batch_errors,
        })
    }

    /// Starts the HTTP server serving /metrics and /healthz.
    pub async fn start(&self) -> Result<()> {
        let addr = if self.addr.is_empty() {
            ":9102"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let registry = self.registry.clone();
        let app_state = Arc::new(AppState { registry });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(())
    }

    /// Gracefully shuts down the health metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "encoding metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "encoding error".to_string(),
        );
    }

    match String::from_utf8(buffer) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "converting metrics to string");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_collision() {
        let health = HealthMetrics::new(":0").unwrap();
        health.events_received.inc();
        health.buckets_tracked.set(7.0);
        health.flush_duration.observe(0.25);

        let families = health.registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "taskwatch_events_received_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "taskwatch_buckets_tracked"));
    }

    #[tokio::test]
    async fn test_server_start_stop() {
        let health = HealthMetrics::new("127.0.0.1:0").unwrap();
        health.start().await.unwrap();
        health.stop().await.unwrap();
    }
}
