use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Engine timing constants — the tolerance window in the reminder policy
// assumes the cycle ticks at least this often.
pub const DEFAULT_TICK_SECS: u64 = 3600;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 10_000; // per channel call
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 8; // in-flight users per cycle
pub const DEFAULT_PUSH_TTL_SECS: u64 = 86_400; // push service may hold for a day

/// Top-level config (arcana.toml + ARCANA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArcanaConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl ArcanaConfig {
    /// Load config from a TOML file with ARCANA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.arcana/arcana.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ArcanaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ARCANA_").split("_"))
            .extract()
            .map_err(|e| crate::error::ArcanaError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Cycle cadence and dispatch bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler cycles.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Per-channel send timeout; a hung transport must not stall the cycle.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// How many users are dispatched concurrently within one cycle.
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
        }
    }
}

/// Delivery channel configuration. A channel with no section configured is
/// simply never attempted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
}

/// SMTP relay settings for the email channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname (e.g. "smtp.postmarkapp.com").
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address, e.g. "readings@arcana.app".
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// STARTTLS on the relay connection (port 587 convention).
    #[serde(default = "bool_true")]
    pub use_tls: bool,
}

/// Web push transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// TTL header sent to the push service, in seconds.
    #[serde(default = "default_push_ttl")]
    pub ttl_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_PUSH_TTL_SECS,
        }
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.arcana/arcana.toml", home)
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.arcana/arcana.db", home)
}

fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}

fn default_dispatch_timeout_ms() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_MS
}

fn default_dispatch_concurrency() -> usize {
    DEFAULT_DISPATCH_CONCURRENCY
}

fn default_push_ttl() -> u64 {
    DEFAULT_PUSH_TTL_SECS
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Arcana".to_string()
}

fn bool_true() -> bool {
    true
}
