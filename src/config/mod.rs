//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional
//! `config/sidekick` file, then `SIDE__`-prefixed environment variables
//! (e.g. `SIDE__SERVER__PORT=9000`). Two dedicated variables are honored on
//! top of that: `SIDE_ALLOWED_ORIGINS` (comma-separated origin allowlist)
//! and `SIDE_APP_ENV` (`development` widens the default allowlist with the
//! Vite dev-server origins).

pub mod origins;

pub use origins::OriginAllowlist;

use serde::{Deserialize, Serialize};

/// Default API port. Also seeds the localhost entries of the origin
/// allowlist.
pub const DEFAULT_PORT: u16 = 8855;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Deployment environment (`development` loosens origin defaults).
    #[serde(default = "default_app_env")]
    pub app_env: String,
    /// Raw comma-separated origin allowlist (`SIDE_ALLOWED_ORIGINS`).
    #[serde(default)]
    pub allowed_origins: Option<String>,
    /// Off-hours schedule exposed at `/api/v1/off_hours`.
    #[serde(default)]
    pub off_hours: OffHoursConfig,
    /// LLM providers exposed at `/api/v1/providers`.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    /// Models exposed at `/api/v1/models`.
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl AppConfig {
    /// Load configuration from defaults, the optional config file, and the
    /// environment.
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let loaded = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", i64::from(DEFAULT_PORT))?
            .set_default("server.timeout_secs", 300)?
            .set_default("server.ws_read_timeout_secs", 8)?
            .set_default("server.subscriber_buffer", 100)?
            .set_default("app_env", "production")?
            .add_source(config::File::with_name("config/sidekick").required(false))
            .add_source(
                config::Environment::with_prefix("SIDE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = loaded.try_deserialize().unwrap_or_default();

        // Dedicated environment variables
        if let Ok(env) = std::env::var("SIDE_APP_ENV") {
            app_config.app_env = env;
        }
        if let Ok(raw) = std::env::var("SIDE_ALLOWED_ORIGINS") {
            app_config.allowed_origins = Some(raw);
        }

        Ok(app_config)
    }

    /// Whether this process runs in development mode.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    /// Build the effective origin allowlist: localhost seeds for the
    /// configured port, the dev-server seeds in development, plus every
    /// origin named in `SIDE_ALLOWED_ORIGINS`.
    pub fn origin_allowlist(&self) -> Result<OriginAllowlist, origins::OriginParseError> {
        OriginAllowlist::build(
            self.server.port,
            self.is_development(),
            self.allowed_origins.as_deref(),
        )
    }
}

fn default_app_env() -> String {
    "production".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            app_env: default_app_env(),
            allowed_origins: None,
            off_hours: OffHoursConfig::default(),
            providers: Vec::new(),
            models: Vec::new(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// WebSocket read deadline in seconds, refreshed per received frame.
    #[serde(default = "default_ws_read_timeout")]
    pub ws_read_timeout_secs: u64,
    /// Bounded delivery buffer per stream subscriber; overflow drops
    /// messages for that subscriber only.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    300
}

fn default_ws_read_timeout() -> u64 {
    8
}

fn default_subscriber_buffer() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
            ws_read_timeout_secs: default_ws_read_timeout(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Off-hours window during which background work is preferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffHoursConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Local wall-clock start, `HH:MM`.
    #[serde(default = "default_off_hours_start")]
    pub start: String,
    /// Local wall-clock end, `HH:MM`.
    #[serde(default = "default_off_hours_end")]
    pub end: String,
}

fn default_off_hours_start() -> String {
    "22:00".to_string()
}

fn default_off_hours_end() -> String {
    "06:00".to_string()
}

impl Default for OffHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_off_hours_start(),
            end: default_off_hours_end(),
        }
    }
}

/// One configured LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// One configured model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub default: bool,
}
