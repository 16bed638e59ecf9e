//! Stock Analysis Port (Driven Port)
//!
//! Interface to a language-model provider that compares a list of
//! companies and returns a structured JSON analysis.

use async_trait::async_trait;
use serde_json::Value;

/// Provider of company comparisons.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockAnalyzer: Send + Sync {
    /// Produce an analysis object for `companies`.
    async fn analyze(&self, companies: &[String]) -> Result<Value, AnalysisError>;

    /// Provider name for logging.
    fn provider(&self) -> &'static str;
}

/// Analysis errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// The request never reached the provider or timed out.
    #[error("analysis provider unreachable: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("analysis provider returned {status}: {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The provider's answer did not contain a JSON analysis.
    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}
