use common::retry::RetryPolicy;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Subject pattern carrying telemetry messages
    #[serde(default = "default_nats_subject")]
    pub nats_subject: String,

    /// Queue group shared by bridge instances; unset delivers every
    /// message to every instance
    #[serde(default)]
    pub nats_queue_group: Option<String>,

    /// Timeout for a single NATS connection attempt in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // ClickHouse configuration
    #[serde(default = "default_clickhouse_host")]
    pub clickhouse_host: String,

    /// ClickHouse HTTP port
    #[serde(default = "default_clickhouse_port")]
    pub clickhouse_port: u16,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    /// Table receiving one row per record
    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,

    /// Create the table at startup if it is missing
    #[serde(default = "default_clickhouse_ensure_table")]
    pub clickhouse_ensure_table: bool,

    // Startup retry configuration
    /// Total connection attempts, 0 for no limit
    #[serde(default)]
    pub retry_max_attempts: u32,

    /// Give up connecting after this many seconds, 0 for no limit
    #[serde(default = "default_retry_max_elapsed_secs")]
    pub retry_max_elapsed_secs: u64,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Randomisation factor applied to each delay (0.0 to 1.0)
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,

    // OpenTelemetry configuration
    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("SENML_BRIDGE"))
            .build()?
            .try_deserialize()
    }

    /// Backoff applied to the startup connections
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts((self.retry_max_attempts > 0).then_some(self.retry_max_attempts))
            .with_max_elapsed(
                (self.retry_max_elapsed_secs > 0)
                    .then(|| Duration::from_secs(self.retry_max_elapsed_secs)),
            )
            .with_initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
            .with_multiplier(self.retry_multiplier)
            .with_max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .with_jitter(self.retry_jitter)
    }
}

// Hand-written so the ClickHouse password never reaches the logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("nats_url", &self.nats_url)
            .field("nats_subject", &self.nats_subject)
            .field("nats_queue_group", &self.nats_queue_group)
            .field("startup_timeout_secs", &self.startup_timeout_secs)
            .field("clickhouse_host", &self.clickhouse_host)
            .field("clickhouse_port", &self.clickhouse_port)
            .field("clickhouse_database", &self.clickhouse_database)
            .field("clickhouse_username", &self.clickhouse_username)
            .field("clickhouse_password", &"<redacted>")
            .field("clickhouse_table", &self.clickhouse_table)
            .field("clickhouse_ensure_table", &self.clickhouse_ensure_table)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_max_elapsed_secs", &self.retry_max_elapsed_secs)
            .field("retry_initial_delay_ms", &self.retry_initial_delay_ms)
            .field("retry_multiplier", &self.retry_multiplier)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("retry_jitter", &self.retry_jitter)
            .field("otel_endpoint", &self.otel_endpoint)
            .field("otel_enabled", &self.otel_enabled)
            .field("otel_service_name", &self.otel_service_name)
            .finish()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_subject() -> String {
    "msg.*".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_clickhouse_host() -> String {
    "localhost".to_string()
}

fn default_clickhouse_port() -> u16 {
    8123
}

fn default_clickhouse_database() -> String {
    "senml".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_clickhouse_table() -> String {
    "messages".to_string()
}

fn default_clickhouse_ensure_table() -> bool {
    true
}

fn default_retry_max_elapsed_secs() -> u64 {
    900
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_multiplier() -> f64 {
    1.5
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_retry_jitter() -> f64 {
    0.5
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "senml-bridge".to_string()
}
