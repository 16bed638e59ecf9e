//! Server Configuration Settings
//!
//! Configuration types for the broadcast server, loaded from environment
//! variables.
//!
//! Every setting has a default. A variable that is set but cannot be parsed
//! falls back to its default, except where an unusable value would leave the
//! server unable to run (listen host, zero tick period, zero log capacity);
//! those are startup errors.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::domain::throughput::{DEFAULT_LOG_CAPACITY, DEFAULT_RATE_WINDOW};

// =============================================================================
// Analysis Provider
// =============================================================================

/// OpenAI-compatible chat completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisProvider {
    /// Groq.
    Groq,
    /// xAI.
    Xai,
    /// OpenAI.
    OpenAi,
}

impl AnalysisProvider {
    /// Providers in selection order, with the variable holding each key.
    pub const PRECEDENCE: [(Self, &'static str); 3] = [
        (Self::Groq, "GROQ_API_KEY"),
        (Self::Xai, "XAI_API_KEY"),
        (Self::OpenAi, "OPENAI_API_KEY"),
    ];

    /// Short provider name used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Xai => "xai",
            Self::OpenAi => "openai",
        }
    }

    /// API base URL, without the `/chat/completions` suffix.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Xai => "https://api.x.ai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Chat model requested from the provider.
    #[must_use]
    pub const fn model(&self) -> &'static str {
        match self {
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Xai => "grok-beta",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

/// Provider API key.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// Get the raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Stock analysis settings.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Selected provider and its key; `None` disables analysis.
    pub provider: Option<(AnalysisProvider, ApiKey)>,
    /// Upstream request timeout.
    pub timeout: Duration,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// Listen address settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen host.
    pub host: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Grace period for draining on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3001,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerSettings {
    /// Socket address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Broadcast cadence settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Tick period.
    pub interval: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
        }
    }
}

/// Throughput metrics settings.
#[derive(Debug, Clone)]
pub struct MetricsSettings {
    /// Trailing window for the messages-per-second rate.
    pub window: Duration,
    /// Delivery timestamps retained.
    pub log_capacity: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_RATE_WINDOW,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Listen address settings.
    pub server: ServerSettings,
    /// Broadcast cadence.
    pub broadcast: BroadcastSettings,
    /// Throughput metrics.
    pub metrics: MetricsSettings,
    /// Stock analysis.
    pub analysis: AnalysisSettings,
}

impl ServerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value the server cannot run without is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = match env.get("HOST") {
            Some(raw) => raw
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "HOST".to_string(),
                    value: raw,
                })?,
            None => ServerSettings::default().host,
        };

        let server = ServerSettings {
            host,
            port: env.parse_u16("PORT", ServerSettings::default().port),
            shutdown_timeout: env.parse_duration_secs(
                "SHUTDOWN_TIMEOUT_SECS",
                ServerSettings::default().shutdown_timeout,
            ),
        };

        let broadcast = BroadcastSettings {
            interval: env.parse_duration_millis(
                "BROADCAST_INTERVAL_MS",
                BroadcastSettings::default().interval,
            ),
        };
        if broadcast.interval.is_zero() {
            return Err(ConfigError::ZeroValue("BROADCAST_INTERVAL_MS".to_string()));
        }

        let metrics = MetricsSettings {
            window: env.parse_duration_secs("METRICS_WINDOW_SECS", MetricsSettings::default().window),
            log_capacity: env.parse_usize(
                "METRICS_LOG_CAPACITY",
                MetricsSettings::default().log_capacity,
            ),
        };
        if metrics.window.is_zero() {
            return Err(ConfigError::ZeroValue("METRICS_WINDOW_SECS".to_string()));
        }
        if metrics.log_capacity == 0 {
            return Err(ConfigError::ZeroValue("METRICS_LOG_CAPACITY".to_string()));
        }

        let provider = AnalysisProvider::PRECEDENCE
            .iter()
            .find_map(|(provider, key)| env.get(key).map(|k| (*provider, ApiKey::new(k))));

        let analysis = AnalysisSettings {
            provider,
            timeout: env.parse_duration_secs(
                "ANALYSIS_TIMEOUT_SECS",
                AnalysisSettings::default().timeout,
            ),
        };

        Ok(Self {
            server,
            broadcast,
            metrics,
            analysis,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Environment variable must be greater than zero.
    #[error("environment variable {0} must be greater than zero")]
    ZeroValue(String),
}

// =============================================================================
// Parsing Helpers
// =============================================================================

/// Variable source. Empty values count as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_u16(&self, key: &str, default: u16) -> u16 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn parse_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn parse_duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
