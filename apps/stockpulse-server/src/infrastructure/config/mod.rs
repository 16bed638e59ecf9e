//! Configuration Module
//!
//! Configuration loading for the broadcast server.

mod settings;

pub use settings::{
    AnalysisProvider, AnalysisSettings, ApiKey, BroadcastSettings, ConfigError, MetricsSettings,
    ServerConfig, ServerSettings,
};
