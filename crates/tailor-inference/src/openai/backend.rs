//! OpenAI chat completions and embeddings backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, info, warn};

use tailor_core::{
    defaults, Completion, CompletionRequest, Embeddings, Error, Provider, ProviderBackend, Result,
    Vector,
};

use super::types::*;
use crate::provider::error::{to_tailor_error, transport_error, ProviderErrorCode};

/// Configuration for the OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication.
    pub api_key: Option<String>,
    /// Outer HTTP timeout in seconds. Per-call deadlines are applied by the
    /// invoker.
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_URL.to_string(),
            api_key: None,
            timeout_seconds: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

/// OpenAI backend serving any OpenAI-hosted model id.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "provider",
            provider = "openai",
            base_url = %config.base_url,
            has_key = config.api_key.is_some(),
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Map a non-success response to a tailor error.
    async fn error_from_response(&self, model_id: &str, response: Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (error_type, message) = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
            Ok(parsed) => (
                parsed.error.code.unwrap_or(parsed.error.error_type),
                parsed.error.message,
            ),
            Err(_) => (String::new(), body),
        };

        let code = ProviderErrorCode::from_response(status, &error_type);
        warn!(
            subsystem = "provider",
            provider = "openai",
            model = model_id,
            status,
            error_type = %error_type,
            "OpenAI request failed"
        );
        to_tailor_error(
            Provider::OpenAI,
            model_id,
            code,
            &format!("HTTP {}: {}", status, message),
        )
    }
}

#[async_trait]
impl ProviderBackend for OpenAIBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn complete(&self, model_id: &str, request: &CompletionRequest) -> Result<Completion> {
        debug!(
            subsystem = "provider",
            provider = "openai",
            op = "complete",
            model = model_id,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let body = ChatCompletionRequest {
            model: model_id,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(model_id, &e))?;

        if !response.status().is_success() {
            return Err(self.error_from_response(model_id, response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let text = result
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let (tokens_in, tokens_out) = result
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        debug!(
            subsystem = "provider",
            provider = "openai",
            op = "complete",
            model = model_id,
            tokens_in,
            tokens_out,
            "Chat completion finished"
        );
        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
        })
    }

    async fn embed(&self, model_id: &str, texts: &[String]) -> Result<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings {
                vectors: vec![],
                tokens_in: 0,
            });
        }

        debug!(
            subsystem = "provider",
            provider = "openai",
            op = "embed",
            model = model_id,
            input_count = texts.len(),
            "Embedding texts"
        );

        let body = EmbeddingRequest {
            model: model_id,
            input: texts,
            encoding_format: Some("float"),
        };

        let response = self
            .build_request("/embeddings")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(model_id, &e))?;

        if !response.status().is_success() {
            return Err(self.error_from_response(model_id, response).await);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        if let Some((pos, bad)) = data.iter().enumerate().find(|(pos, d)| d.index != *pos) {
            return Err(Error::Embedding(format!(
                "Embedding index {} at position {} is duplicated or out of range",
                bad.index, pos
            )));
        }

        Ok(Embeddings {
            vectors: data.into_iter().map(|d| Vector::from(d.embedding)).collect(),
            tokens_in: result.usage.prompt_tokens,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut req = self.client.get(&url).timeout(Duration::from_secs(5));
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(
                    subsystem = "provider",
                    provider = "openai",
                    status = resp.status().as_u16(),
                    "OpenAI health check failed"
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    subsystem = "provider",
                    provider = "openai",
                    error = %e,
                    "OpenAI health check error"
                );
                Ok(false)
            }
        }
    }
}
