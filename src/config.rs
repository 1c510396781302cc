//! Configuration types for options-history

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Firefox identity presented to the finance site
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:75.0) Gecko/20100101 Firefox/75.0";

/// Pipeline sizing and the time-budget checkpoint
///
/// Queue capacities are derived from these values: the ticker queue holds
/// `ticker_queue_size` entries, every later queue holds
/// `ticker_queue_size + max_connections`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of expiration-resolver workers (default: 10)
    #[serde(default = "default_resolver_workers")]
    pub resolver_workers: usize,

    /// Capacity of the ticker queue (default: 10)
    ///
    /// Raised to `resolver_workers` if smaller.
    #[serde(default = "default_ticker_queue_size")]
    pub ticker_queue_size: usize,

    /// Number of table-fetch workers and the cap on in-flight HTTP requests (default: 25)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Number of writer workers (default: 2)
    #[serde(default = "default_writer_workers")]
    pub writer_workers: usize,

    /// Remaining execution time below which intake stops and hands the rest
    /// of the backlog to a continuation (default: 280 seconds)
    #[serde(default = "default_time_safety_margin", with = "duration_serde")]
    pub time_safety_margin: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolver_workers: default_resolver_workers(),
            ticker_queue_size: default_ticker_queue_size(),
            max_connections: default_max_connections(),
            writer_workers: default_writer_workers(),
            time_safety_margin: default_time_safety_margin(),
        }
    }
}

impl PipelineConfig {
    /// Capacity of the intake → resolver queue
    pub fn ticker_queue_capacity(&self) -> usize {
        self.ticker_queue_size.max(self.resolver_workers).max(1)
    }

    /// Capacity of every queue after the first
    pub fn item_queue_capacity(&self) -> usize {
        self.ticker_queue_capacity() + self.max_connections
    }
}

/// Finance site access
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Scheme and host of the finance site (default: "https://finance.yahoo.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Data storage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database holding option records and the ticker registry
    /// (default: "./options_history.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Endpoints of the invoking host
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostConfig {
    /// URL receiving the end-of-run unreachable report (None = log only)
    #[serde(default)]
    pub error_sink_url: Option<String>,

    /// URL that accepts continuation events (None = continuations cannot be scheduled)
    #[serde(default)]
    pub continuation_url: Option<String>,

    /// Timeout for both notifications (default: 10 seconds)
    #[serde(default = "default_notify_timeout", with = "duration_serde")]
    pub notify_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            error_sink_url: None,
            continuation_url: None,
            notify_timeout: default_notify_timeout(),
        }
    }
}

/// Main configuration for the collector
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pools, queues and time budget
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Finance site access
    #[serde(default)]
    pub source: SourceConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Host endpoints for reporting and continuation
    #[serde(default)]
    pub host: HostConfig,
}

impl Config {
    /// Defaults overlaid with environment variables
    ///
    /// Recognized: `TICKERQUEUESIZE`, `RESOLVERWORKERS`, `MAXCONNECTIONS`,
    /// `OPTIONS_HISTORY_DB`, `NOTREACHABLE_URL`, `CONTINUATION_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(v) = parse_var(&lookup, "TICKERQUEUESIZE")? {
            config.pipeline.ticker_queue_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RESOLVERWORKERS")? {
            config.pipeline.resolver_workers = v;
        }
        if let Some(v) = parse_var(&lookup, "MAXCONNECTIONS")? {
            config.pipeline.max_connections = v;
        }
        if let Some(path) = lookup("OPTIONS_HISTORY_DB") {
            config.persistence.database_path = PathBuf::from(path);
        }
        config.host.error_sink_url = lookup("NOTREACHABLE_URL").or(config.host.error_sink_url);
        config.host.continuation_url = lookup("CONTINUATION_URL").or(config.host.continuation_url);

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let pools = [
            ("resolver_workers", self.pipeline.resolver_workers),
            ("max_connections", self.pipeline.max_connections),
            ("writer_workers", self.pipeline.writer_workers),
        ];
        for (key, width) in pools {
            if width == 0 {
                return Err(Error::Config {
                    message: format!("{} must be at least 1", key),
                    key: Some(key.to_string()),
                });
            }
        }
        if url::Url::parse(&self.source.base_url).is_err() {
            return Err(Error::Config {
                message: format!("base_url {:?} is not a valid URL", self.source.base_url),
                key: Some("base_url".to_string()),
            });
        }
        Ok(())
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| Error::Config {
            message: format!("{} must be a non-negative integer, got {:?}", key, raw),
            key: Some(key.to_string()),
        }),
    }
}

fn default_resolver_workers() -> usize {
    10
}

fn default_ticker_queue_size() -> usize {
    10
}

fn default_max_connections() -> usize {
    25
}

fn default_writer_workers() -> usize {
    2
}

fn default_time_safety_margin() -> Duration {
    Duration::from_secs(280)
}

fn default_base_url() -> String {
    "https://finance.yahoo.com".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./options_history.db")
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(10)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
