use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the taskwatch agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// Inbound task-attempt record stream configuration.
    #[serde(default)]
    pub source: SourceConfig,

    /// Entity storage service connection configuration.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Sink configuration.
    #[serde(default)]
    pub sinks: SinksConfig,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Inbound record stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Path to a newline-delimited JSON record file, or "-" for stdin.
    #[serde(default = "default_source_path")]
    pub path: String,
}

/// Entity storage service connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service hostname.
    #[serde(default)]
    pub host: String,

    /// Service port.
    #[serde(default = "default_service_port")]
    pub port: u16,

    /// Service username.
    #[serde(default)]
    pub username: String,

    /// Service password.
    #[serde(default)]
    pub password: String,

    /// Read timeout applied to every service call. Default: 60s.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
}

/// Sink configuration.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SinksConfig {
    /// Task-attempt counter aggregation sink.
    #[serde(default)]
    pub counter: CounterSinkConfig,

    /// Passthrough logging sink.
    #[serde(default)]
    pub logging: LoggingSinkConfig,
}

/// Counter aggregation sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterSinkConfig {
    /// Enable the counter sink. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum rows per entity service submission. Default: 1000.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Time between periodic flushes. Default: 30s.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
}

/// Passthrough logging sink configuration.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoggingSinkConfig {
    /// Enable the logging sink. Default: false.
    #[serde(default)]
    pub enabled: bool,
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Deserialize)]
pub struct HealthConfig {
    /// Listen address. Default: ":9102".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_path() -> String {
    "-".to_string()
}

fn default_service_port() -> u16 {
    9090
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_health_addr() -> String {
    ":9102".to_string()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source: SourceConfig::default(),
            service: ServiceConfig::default(),
            sinks: SinksConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_service_port(),
            username: String::new(),
            password: String::new(),
            read_timeout: default_read_timeout(),
        }
    }
}

impl Default for CounterSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.source.path.is_empty() {
            bail!("source.path is required");
        }

        if !self.sinks.counter.enabled && !self.sinks.logging.enabled {
            bail!("at least one sink must be enabled");
        }

        if self.sinks.counter.enabled {
            if self.service.host.is_empty() {
                bail!("service.host is required when the counter sink is enabled");
            }

            if self.service.port == 0 {
                bail!("service.port must be positive");
            }

            if self.service.read_timeout.is_zero() {
                bail!("service.read_timeout must be positive");
            }

            if self.sinks.counter.batch_size == 0 {
                bail!("sinks.counter.batch_size must be positive");
            }

            if self.sinks.counter.flush_interval.is_zero() {
                bail!("sinks.counter.flush_interval must be positive");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg: Config = serde_yaml::from_str(
            r"
service:
  host: entities.internal
",
        )
        .unwrap();

        cfg.validate().unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.source.path, "-");
        assert_eq!(cfg.service.port, 9090);
        assert_eq!(cfg.service.read_timeout, Duration::from_secs(60));
        assert!(cfg.sinks.counter.enabled);
        assert_eq!(cfg.sinks.counter.batch_size, 1000);
        assert_eq!(cfg.sinks.counter.flush_interval, Duration::from_secs(30));
        assert!(!cfg.sinks.logging.enabled);
        assert_eq!(cfg.health.addr, ":9102");
    }

    #[test]
    fn test_humantime_durations() {
        let cfg: Config = serde_yaml::from_str(
            r"
service:
  host: entities.internal
  read_timeout: 15s
sinks:
  counter:
    flush_interval: 2m
",
        )
        .unwrap();

        assert_eq!(cfg.service.read_timeout, Duration::from_secs(15));
        assert_eq!(cfg.sinks.counter.flush_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_validate_requires_service_host_for_counter_sink() {
        let cfg: Config = serde_yaml::from_str("source: { path: '-' }").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("service.host"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let cfg: Config = serde_yaml::from_str(
            r"
service:
  host: entities.internal
sinks:
  counter:
    batch_size: 0
",
        )
        .unwrap();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_requires_some_sink() {
        let cfg: Config = serde_yaml::from_str(
            r"
service:
  host: entities.internal
sinks:
  counter:
    enabled: false
",
        )
        .unwrap();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at least one sink"));
    }

    #[test]
    fn test_logging_only_config_skips_service_validation() {
        let cfg: Config = serde_yaml::from_str(
            r"
sinks:
  counter:
    enabled: false
  logging:
    enabled: true
",
        )
        .unwrap();

        cfg.validate().unwrap();
    }
}
