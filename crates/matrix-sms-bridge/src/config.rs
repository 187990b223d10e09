//! Configuration for the bridge, loaded from environment variables.

use crate::push::DEFAULT_PUSH_URL;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Matrix homeserver configuration
    pub matrix: MatrixConfig,

    /// Acrobits push relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Registry storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Internal API access
    #[serde(default)]
    pub admin: AdminConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatrixConfig {
    /// Homeserver base URL (e.g. https://matrix.example.com)
    pub homeserver_url: String,

    /// Timeout for every homeserver request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long a logged-in session is reused
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Timeline events requested per room on fetch
    #[serde(default = "default_timeline_limit")]
    pub timeline_limit: u32,

    /// How often expired sessions are purged
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub session_cleanup_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// PNM send endpoint
    #[serde(default = "default_push_url")]
    pub push_url: String,

    /// Timeout for a single push delivery
    #[serde(default = "default_relay_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the registry snapshots
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,

    /// Enable persistence (if false, registries are in-memory only)
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Shared secret for the internal API; unset disables those routes
    #[serde(default)]
    pub token: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Client API requests per minute
    #[serde(default = "default_client_rpm")]
    pub client_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            push_url: default_push_url(),
            timeout: default_relay_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            persist: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            client_per_minute: default_client_rpm(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_session_ttl() -> Duration {
    crate::session::DEFAULT_SESSION_TTL
}

fn default_timeline_limit() -> u32 {
    50
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_push_url() -> String {
    DEFAULT_PUSH_URL.into()
}

fn default_relay_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_true() -> bool {
    true
}

fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_client_rpm() -> u32 {
    600
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

impl StorageConfig {
    pub fn push_tokens_path(&self) -> PathBuf {
        self.dir.join("push_tokens.json")
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.dir.join("sms_mappings.json")
    }
}

impl ServerConfig {
    /// Address to bind; an unparsable `listen_addr` is an error.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen_addr
            .trim()
            .parse()
            .with_context(|| format!("Invalid server.listen_addr: {:?}", self.listen_addr))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Load configuration from environment variables
    /// (`MATRIX__HOMESERVER_URL`, `STORAGE__DIR`, ...).
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
