use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::content::store::{ExpiryPolicy, StoreSettings};

/// Command-line surface. Every field left unset here falls through to the
/// env, TOML and built-in layers, so a flag only wins when it was passed.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "vanish-server", version, about = "Ephemeral encrypted content exchange")]
pub struct Cli {
    /// Port to listen on [default: 3000]
    #[arg(long, env = "VANISH_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "VANISH_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./vanish.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "VANISH_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for the SQLite database [default: ./data]
    #[arg(long, env = "VANISH_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Fully resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,

    pub bind_address: String,

    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub generate_config: bool,

    pub data_dir: String,

    /// Content store configuration (loaded from [content] section in TOML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentConfig>,

    /// Rate limiting for allocate/create (loaded from [rate_limit] section in TOML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Configuration for the ephemeral content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Hours a record stays readable after creation (default: 24)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,

    /// Seconds a reserved-but-unused code is held (default: 86400)
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_secs: u64,

    /// Interval in seconds between retention cleanup runs (default: 300)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Maximum ciphertext size in megabytes (default: 10)
    #[serde(default = "default_max_payload")]
    pub max_payload_mb: u32,

    /// Generate-and-check rounds before allocation gives up (default: 16)
    #[serde(default = "default_allocation_attempts")]
    pub allocation_attempts: u32,

    /// "anchored" (updates keep the original expiry) or "sliding"
    /// (each update restarts the TTL)
    #[serde(default)]
    pub expiry_policy: ExpiryPolicy,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            reservation_ttl_secs: 86400,
            cleanup_interval_secs: 300,
            max_payload_mb: 10,
            allocation_attempts: 16,
            expiry_policy: ExpiryPolicy::Anchored,
        }
    }
}

impl ContentConfig {
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            ttl: chrono::Duration::hours(i64::from(self.ttl_hours.max(1))),
            // Capped at a year; chrono panics on out-of-range durations
            reservation_ttl: chrono::Duration::seconds(
                self.reservation_ttl_secs.clamp(1, 365 * 86400) as i64,
            ),
            expiry_policy: self.expiry_policy,
            allocation_attempts: self.allocation_attempts.max(1),
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_mb as usize * 1024 * 1024
    }
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_reservation_ttl() -> u64 {
    86400
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_max_payload() -> u32 {
    10
}

fn default_allocation_attempts() -> u32 {
    16
}

/// Per-IP rate limiting on the code allocation and create endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is applied (default: true)
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Seconds to replenish one request token (default: 6 = 10 per minute)
    #[serde(default = "default_per_second")]
    pub per_second: u64,

    /// Requests allowed in a burst (default: 10)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: 6,
            burst_size: 10,
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_per_second() -> u64 {
    6
}

fn default_burst_size() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            content: Some(ContentConfig::default()),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (VANISH_*) < CLI args
    ///
    /// Nested sections take `__` in env names, e.g. `VANISH_CONTENT__TTL_HOURS`.
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Cli::parse();
        Self::figment(cli).extract()
    }

    fn figment(cli: Cli) -> Figment {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("VANISH_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    pub fn content(&self) -> ContentConfig {
        self.content.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Vanish Server Configuration
# Place this file at ./vanish.toml or specify with --config <path>
# All settings can be overridden via environment variables (VANISH_PORT,
# VANISH_CONTENT__TTL_HOURS, etc.) or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# ---- Content Store ----
# [content]

# Hours a document stays readable after it was created (default: 24)
# ttl_hours = 24

# Seconds an allocated code is held while waiting for content (default: 86400)
# reservation_ttl_secs = 86400

# Interval in seconds between retention cleanup runs (default: 300)
# cleanup_interval_secs = 300

# Maximum ciphertext size in megabytes (default: 10)
# max_payload_mb = 10

# Attempts at finding a free access code before giving up (default: 16)
# allocation_attempts = 16

# "anchored": updates never extend the expiry (default)
# "sliding":  every update restarts the full TTL
# expiry_policy = "anchored"

# ---- Rate Limiting (code allocation and create) ----
# [rate_limit]
# enabled = true
# per_second = 6   # one request token every 6 seconds
# burst_size = 10
"#
    .to_string()
}
