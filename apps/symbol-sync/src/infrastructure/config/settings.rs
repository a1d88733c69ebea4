//! Sync Configuration Settings
//!
//! Configuration types for the sync engine, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::HydrationConfig;
use crate::application::services::cursor_store::DEFAULT_FLUSH_INTERVAL;
use crate::application::services::delta_puller::DEFAULT_OPS_PAGE_SIZE;
use crate::application::services::events::DEFAULT_EVENT_CAPACITY;
use crate::infrastructure::http::{DEFAULT_ORACLE_API_URL, RetryConfig};
use crate::infrastructure::oracle::registration::DEFAULT_ROLE;
use crate::infrastructure::oracle::reconnect::DEFAULT_RECONNECT_DELAY;
use crate::infrastructure::oracle::{DEFAULT_FEED_CAPACITY, DEFAULT_ORACLE_WS_URL};
use crate::infrastructure::storage::DEFAULT_STORE_PATH;

/// Oracle credentials.
#[derive(Clone)]
pub struct Credentials {
    token: String,
    user_id: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(token: String, user_id: String) -> Self {
        Self { token, user_id }
    }

    /// Bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// User id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Oracle endpoint settings.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    /// WebSocket URL.
    pub ws_url: String,
    /// REST base URL.
    pub api_url: String,
    /// Client role sent in the manifest.
    pub role: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_ORACLE_WS_URL.to_string(),
            api_url: DEFAULT_ORACLE_API_URL.to_string(),
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

/// Synchronization tuning.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Delay before each reconnect.
    pub reconnect_delay: Duration,
    /// Ops requested per delta page.
    pub ops_page_size: usize,
    /// Snapshot pagination.
    pub hydration: HydrationConfig,
    /// Cursor store file.
    pub cursor_path: PathBuf,
    /// Cursor write coalescing interval.
    pub cursor_flush_interval: Duration,
    /// Capacity of each recent-feed buffer.
    pub feed_capacity: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ops_page_size: DEFAULT_OPS_PAGE_SIZE,
            hydration: HydrationConfig::default(),
            cursor_path: PathBuf::from(DEFAULT_STORE_PATH),
            cursor_flush_interval: DEFAULT_FLUSH_INTERVAL,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// REST client settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Oracle credentials.
    pub credentials: Credentials,
    /// Oracle endpoints.
    pub oracle: OracleSettings,
    /// Sync tuning.
    pub sync: SyncSettings,
    /// REST client settings.
    pub http: HttpSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl SyncConfig {
    /// Configuration with defaults for everything but the credentials.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials,
            oracle: OracleSettings::default(),
            sync: SyncSettings::default(),
            http: HttpSettings::default(),
            server: ServerSettings::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `ORACLE_TOKEN` or `ORACLE_USER_ID` is missing or
    /// blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `ORACLE_TOKEN` or `ORACLE_USER_ID` is missing or
    /// blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let token = env.required("ORACLE_TOKEN")?;
        let user_id = env.required("ORACLE_USER_ID")?;

        let oracle_defaults = OracleSettings::default();
        let oracle = OracleSettings {
            ws_url: env.string("ORACLE_WS_URL", oracle_defaults.ws_url),
            api_url: env.string("ORACLE_API_URL", oracle_defaults.api_url),
            role: env.string("ORACLE_ROLE", oracle_defaults.role),
        };

        let sync_defaults = SyncSettings::default();
        let hydration_defaults = sync_defaults.hydration;
        let sync = SyncSettings {
            reconnect_delay: env.parse_env_duration_millis(
                "SYNC_RECONNECT_DELAY_MS",
                sync_defaults.reconnect_delay,
            ),
            ops_page_size: env
                .parse_env_usize("SYNC_OPS_PAGE_SIZE", sync_defaults.ops_page_size)
                .max(1),
            hydration: HydrationConfig {
                probe_size: env
                    .parse_env_usize("SYNC_HYDRATION_PROBE_SIZE", hydration_defaults.probe_size)
                    .max(1),
                target_requests: env
                    .parse_env_usize(
                        "SYNC_HYDRATION_TARGET_REQUESTS",
                        hydration_defaults.target_requests,
                    )
                    .max(1),
                min_page: env
                    .parse_env_usize("SYNC_HYDRATION_MIN_PAGE", hydration_defaults.min_page)
                    .max(1),
                max_page: env
                    .parse_env_usize("SYNC_HYDRATION_MAX_PAGE", hydration_defaults.max_page)
                    .max(1),
            },
            cursor_path: env
                .raw("SYNC_CURSOR_PATH")
                .map_or(sync_defaults.cursor_path, PathBuf::from),
            cursor_flush_interval: env.parse_env_duration_millis(
                "SYNC_CURSOR_FLUSH_INTERVAL_MS",
                sync_defaults.cursor_flush_interval,
            ),
            feed_capacity: env
                .parse_env_usize("SYNC_FEED_BUFFER_CAPACITY", sync_defaults.feed_capacity)
                .max(1),
            event_capacity: env
                .parse_env_usize("SYNC_EVENT_CAPACITY", sync_defaults.event_capacity)
                .max(1),
        };

        let http_defaults = HttpSettings::default();
        let http = HttpSettings {
            timeout: env.parse_env_duration_secs("SYNC_HTTP_TIMEOUT_SECS", http_defaults.timeout),
            retry: RetryConfig {
                max_attempts: env
                    .parse_env_u32("SYNC_HTTP_MAX_ATTEMPTS", http_defaults.retry.max_attempts)
                    .max(1),
                ..http_defaults.retry
            },
        };

        let server = ServerSettings {
            health_port: env
                .parse_env_u16("SYNC_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            credentials: Credentials::new(token, user_id),
            oracle,
            sync,
            http,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.trim().to_string())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.raw(key).map_or(default, |v| v.trim().to_string())
    }

    fn parse_env_u16(&self, key: &str, default: u16) -> u16 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_env_u32(&self, key: &str, default: u32) -> u32 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_env_usize(&self, key: &str, default: usize) -> usize {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_env_duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.raw(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn parse_env_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.raw(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
