//! Chat Completion Analysis Adapter
//!
//! Implements [`StockAnalyzer`] against any OpenAI-compatible
//! `/chat/completions` endpoint (Groq, xAI, OpenAI).
//!
//! One request per call, JSON response mode, no retries. The model's
//! message content is parsed as JSON and returned as-is.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::ports::{AnalysisError, StockAnalyzer};
use crate::infrastructure::config::{AnalysisProvider, AnalysisSettings, ApiKey};
use crate::infrastructure::metrics;

const SYSTEM_PROMPT: &str = "You are a helpful stock market analyst who provides clear, honest, \
and actionable investment guidance. Always respond with valid JSON.";

const TEMPERATURE: f64 = 0.7;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// =============================================================================
// Adapter
// =============================================================================

/// Analyzer backed by an OpenAI-compatible chat completion API.
#[derive(Debug, Clone)]
pub struct ChatCompletionAnalyzer {
    client: Client,
    provider: AnalysisProvider,
    api_key: ApiKey,
    base_url: String,
    model: String,
}

impl ChatCompletionAnalyzer {
    /// Create an analyzer for `provider` at its public endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Network` if the HTTP client cannot be built.
    pub fn new(
        provider: AnalysisProvider,
        api_key: ApiKey,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        Self::with_base_url(provider, api_key, timeout, provider.base_url())
    }

    /// Create an analyzer against an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Network` if the HTTP client cannot be built.
    pub fn with_base_url(
        provider: AnalysisProvider,
        api_key: ApiKey,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        Ok(Self {
            client,
            provider,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: provider.model().to_string(),
        })
    }

    /// Build the analyzer selected by configuration, if any.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Network` if the HTTP client cannot be built.
    pub fn from_settings(settings: &AnalysisSettings) -> Result<Option<Self>, AnalysisError> {
        settings
            .provider
            .as_ref()
            .map(|(provider, key)| Self::new(*provider, key.clone(), settings.timeout))
            .transpose()
    }

    /// Model requested from the provider.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<Value, AnalysisError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::InvalidResponse("no message content".to_string()))?;

        serde_json::from_str(&content).map_err(|e| AnalysisError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StockAnalyzer for ChatCompletionAnalyzer {
    async fn analyze(&self, companies: &[String]) -> Result<Value, AnalysisError> {
        tracing::info!(
            provider = self.provider.as_str(),
            model = %self.model,
            companies = companies.len(),
            "Requesting stock analysis"
        );

        let started = Instant::now();
        let result = self.complete(&build_prompt(companies)).await;
        metrics::record_analysis(self.provider.as_str(), result.is_ok(), started.elapsed());

        if let Err(e) = &result {
            tracing::error!(provider = self.provider.as_str(), error = %e, "Stock analysis failed");
        }
        result
    }

    fn provider(&self) -> &'static str {
        self.provider.as_str()
    }
}

/// User prompt asking for a structured comparison of `companies`.
#[must_use]
pub fn build_prompt(companies: &[String]) -> String {
    format!(
        r#"You are a knowledgeable stock market analyst. A user is interested in investing and wants to compare these companies: {}.

Please provide a comprehensive analysis in JSON format with the following structure:
{{
  "companies": [
    {{
      "name": "Company Name",
      "overview": "Brief overview of the company and its business",
      "strengths": ["3-4 key strengths"],
      "risks": ["3-4 key risks or concerns"]
    }}
  ],
  "comparison": "A paragraph comparing these companies and their relative positions in the market",
  "recommendations": [
    "Step 1: Specific action item",
    "Step 2: Specific action item",
    "Step 3: Specific action item",
    "Step 4: Specific action item"
  ],
  "disclaimer": "Standard investment disclaimer"
}}

Provide practical, actionable recommendations. Be honest about risks. Focus on helping a retail investor make informed decisions."#,
        companies.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_companies() {
        let prompt = build_prompt(&["Apple".to_string(), "Tesla".to_string()]);
        assert!(prompt.contains("compare these companies: Apple, Tesla."));
        assert!(prompt.contains("\"disclaimer\""));
    }

    #[test]
    fn request_shape() {
        let request = ChatRequest {
            model: "m",
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: "p",
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: TEMPERATURE,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "m");
    }

    #[test]
    fn disabled_without_key() {
        let analyzer = ChatCompletionAnalyzer::from_settings(&AnalysisSettings::default()).unwrap();
        assert!(analyzer.is_none());
    }

    #[test]
    fn selected_provider_sets_model() {
        let settings = AnalysisSettings {
            provider: Some((AnalysisProvider::Xai, ApiKey::new("k".to_string()))),
            timeout: Duration::from_secs(5),
        };
        let analyzer = ChatCompletionAnalyzer::from_settings(&settings)
            .unwrap()
            .unwrap();
        assert_eq!(analyzer.model(), "grok-beta");
        assert_eq!(analyzer.provider(), "xai");
    }
}
