//! Mapping of provider HTTP failures onto tailor errors.

use tailor_core::{Error, Provider};

/// Provider failure classes, derived from HTTP status and error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Invalid or missing credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available to this key.
    ModelNotFound,
    /// Prompt exceeds the model's context window.
    ContextLengthExceeded,
    /// Request timed out at the provider.
    Timeout,
    /// Server error or overload.
    ServerError,
    /// Any other rejected request.
    BadRequest,
}

impl ProviderErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401 | 403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (408, _) => Self::Timeout,
            (500..=599, _) => Self::ServerError,
            (404, _) | (_, "model_not_found" | "not_found_error") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            _ => Self::BadRequest,
        }
    }

    /// Check if this error is retryable against another model.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::Timeout | Self::ServerError
        )
    }
}

/// Convert a provider failure to a tailor [`Error`].
pub fn to_tailor_error(
    provider: Provider,
    model: &str,
    code: ProviderErrorCode,
    message: &str,
) -> Error {
    match code {
        ProviderErrorCode::AuthenticationError => Error::ProviderAuth {
            provider: provider.to_string(),
            message: message.to_string(),
        },
        ProviderErrorCode::RateLimitExceeded => {
            Error::unavailable(model, format!("Rate limit exceeded: {}", message))
        }
        ProviderErrorCode::Timeout => {
            Error::unavailable(model, format!("Provider timeout: {}", message))
        }
        ProviderErrorCode::ServerError => {
            Error::unavailable(model, format!("Server error: {}", message))
        }
        ProviderErrorCode::ModelNotFound => Error::Config(format!(
            "Model {} not found at {}: {}",
            model, provider, message
        )),
        ProviderErrorCode::ContextLengthExceeded => {
            Error::InvalidInput(format!("Context too long for {}: {}", model, message))
        }
        ProviderErrorCode::BadRequest => {
            Error::InvalidInput(format!("{} rejected request: {}", provider, message))
        }
    }
}

/// Convert a transport failure (connect, DNS, reset) to a tailor [`Error`].
pub fn transport_error(model: &str, err: &reqwest::Error) -> Error {
    Error::unavailable(model, format!("Request failed: {}", err))
}
