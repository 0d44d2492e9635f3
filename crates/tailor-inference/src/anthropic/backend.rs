//! Anthropic Messages API backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, info, warn};

use tailor_core::{
    defaults, ChatRole, Completion, CompletionRequest, Embeddings, Error, Provider,
    ProviderBackend, Result,
};

use super::types::*;
use crate::provider::error::{to_tailor_error, transport_error, ProviderErrorCode};

/// Configuration for the Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    pub timeout_seconds: u64,
    /// Registry id to dated API model id.
    pub model_aliases: HashMap<String, String>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        let model_aliases = [
            ("claude-sonnet-4", "claude-sonnet-4-20250514"),
            ("claude-3-5-haiku", "claude-3-5-haiku-20241022"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            base_url: defaults::ANTHROPIC_URL.to_string(),
            api_key: None,
            api_version: defaults::ANTHROPIC_VERSION.to_string(),
            timeout_seconds: defaults::HTTP_TIMEOUT_SECS,
            model_aliases,
        }
    }
}

/// Anthropic backend. Generation only; Anthropic has no embeddings API.
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "provider",
            provider = "anthropic",
            base_url = %config.base_url,
            has_key = config.api_key.is_some(),
            "Initializing Anthropic backend"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    /// API model id for a registry id.
    pub fn api_model<'a>(&'a self, model_id: &'a str) -> &'a str {
        self.config
            .model_aliases
            .get(model_id)
            .map(String::as_str)
            .unwrap_or(model_id)
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self
            .client
            .post(&url)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json");

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }
        req
    }

    async fn error_from_response(&self, model_id: &str, response: Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (error_type, message) = match serde_json::from_str::<AnthropicErrorResponse>(&body) {
            Ok(parsed) => (parsed.error.error_type, parsed.error.message),
            Err(_) => (String::new(), body),
        };

        warn!(
            subsystem = "provider",
            provider = "anthropic",
            model = model_id,
            status,
            error_type = %error_type,
            "Anthropic request failed"
        );
        to_tailor_error(
            Provider::Anthropic,
            model_id,
            ProviderErrorCode::from_response(status, &error_type),
            &format!("HTTP {}: {}", status, message),
        )
    }
}

#[async_trait]
impl ProviderBackend for AnthropicBackend {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, model_id: &str, request: &CompletionRequest) -> Result<Completion> {
        // System prompts travel in a top-level field, not as a message.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| AnthropicMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        if messages.is_empty() {
            return Err(Error::InvalidInput(
                "Anthropic requests need at least one user message".to_string(),
            ));
        }

        let body = MessagesRequest {
            model: self.api_model(model_id),
            max_tokens: request.max_tokens_or_default(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            temperature: request.temperature,
        };

        debug!(
            subsystem = "provider",
            provider = "anthropic",
            op = "complete",
            model = model_id,
            api_model = body.model,
            "Sending messages request"
        );

        let response = self
            .build_request("/messages")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(model_id, &e))?;

        if !response.status().is_success() {
            return Err(self.error_from_response(model_id, response).await);
        }

        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        debug!(
            subsystem = "provider",
            provider = "anthropic",
            op = "complete",
            model = model_id,
            tokens_in = result.usage.input_tokens,
            tokens_out = result.usage.output_tokens,
            "Messages request finished"
        );
        Ok(Completion {
            text: result.text(),
            tokens_in: result.usage.input_tokens,
            tokens_out: result.usage.output_tokens,
        })
    }

    async fn embed(&self, model_id: &str, _texts: &[String]) -> Result<Embeddings> {
        Err(Error::Config(format!(
            "Anthropic does not serve embeddings (model {})",
            model_id
        )))
    }
}
