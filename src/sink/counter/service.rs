use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::health::HealthMetrics;

use super::flush::TaskAttemptCounterRow;

/// Service name under which counter rows are registered in the entity store.
const COUNTER_SERVICE: &str = "task_attempt_counter";

/// Transmission seam for the entity storage service.
///
/// `create_batch` submits an ordered collection of rows; submitting an empty
/// collection must be a safe no-op. `close` tears the client down and is
/// invoked exactly once on every flush exit path.
pub trait EntityService: Send + Sync {
    fn create_batch(
        &self,
        rows: &[TaskAttemptCounterRow],
    ) -> impl Future<Output = Result<()>> + Send;

    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Response envelope returned by the entity service create endpoint.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    success: bool,
    #[serde(default)]
    exception: Option<String>,
}

/// HTTP client for the entity storage service.
///
/// Constructed per flush from the configured host, port, credentials, and
/// read timeout; connections are not reused across flushes.
pub struct HttpEntityService {
    client: reqwest::Client,
    entities_url: String,
    username: String,
    password: String,
    health: Option<Arc<HealthMetrics>>,
}

impl HttpEntityService {
    /// Builds a client against the configured service endpoint.
    pub fn connect(cfg: &ServiceConfig, health: Option<Arc<HealthMetrics>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.read_timeout)
            .build()
            .context("building entity service client")?;

        Ok(Self {
            client,
            entities_url: format!("http://{}:{}/api/v1/entities", cfg.host, cfg.port),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            health,
        })
    }
}

impl EntityService for HttpEntityService {
    async fn create_batch(&self, rows: &[TaskAttemptCounterRow]) -> Result<()> {
        let Some(_) = rows.first() else {
            return Ok(());
        };

        let started = Instant::now();

        let result = async {
            let response = self
                .client
                .post(&self.entities_url)
                .query(&[("service", COUNTER_SERVICE)])
                .basic_auth(&self.username, Some(&self.password))
                .json(rows)
                .send()
                .await
                .context("sending entity batch")?;

            let response = response
                .error_for_status()
                .context("entity service rejected batch")?;

            let envelope: CreateResponse = response
                .json()
                .await
                .context("decoding entity service response")?;

            if !envelope.success {
                bail!(
                    "entity service create failed: {}",
                    envelope.exception.as_deref().unwrap_or("unknown error"),
                );
            }

            Ok(())
        }
        .await;

        if let Some(health) = &self.health {
            health
                .service_batch_duration
                .observe(started.elapsed().as_secs_f64());
            health.service_batch_rows.observe(rows.len() as f64);
            if result.is_err() {
                health.service_batch_errors.inc();
            }
        }

        result
    }

    /// Drops the client; the underlying connection pool shuts down with it.
    async fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            host: "localhost".to_string(),
            port: 9090,
            username: "user".to_string(),
            password: "pass".to_string(),
            read_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_entities_url_from_config() {
        let service = HttpEntityService::connect(&test_config(), None).unwrap();
        assert_eq!(
            service.entities_url,
            "http://localhost:9090/api/v1/entities"
        );
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        // No server is listening on the configured endpoint; an empty batch
        // must return before any network activity.
        let service = HttpEntityService::connect(&test_config(), None).unwrap();
        service.create_batch(&[]).await.unwrap();
    }

    #[test]
    fn test_create_response_decodes_failure_envelope() {
        let envelope: CreateResponse =
            serde_json::from_str(r#"{"success":false,"exception":"storage unavailable"}"#).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.exception.as_deref(), Some("storage unavailable"));

        let envelope: CreateResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(envelope.success);
        assert!(envelope.exception.is_none());
    }
}
