//! Error types for tailor model routing.

use thiserror::Error;

/// Result type alias using tailor's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for model selection, invocation, and ranking.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider could not serve the request (network failure, 429, 5xx, timeout).
    ///
    /// Counts against the model's circuit breaker and is retried once against
    /// the strategy's fallback model.
    #[error("Provider unavailable for model {model}: {message}")]
    ProviderUnavailable { model: String, message: String },

    /// Provider rejected the credentials. Fatal, never retried.
    #[error("Provider authentication failed ({provider}): {message}")]
    ProviderAuth { provider: String, message: String },

    /// Vectors of different lengths were compared.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The estimated cost of a call exceeds the active strategy's ceiling.
    #[error(
        "Budget exceeded for model {model}: estimated ${estimated_usd:.6} exceeds ceiling ${ceiling_usd:.6}"
    )]
    BudgetExceeded {
        model: String,
        estimated_usd: f64,
        ceiling_usd: f64,
    },

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed for a non-transient reason
    #[error("Inference error: {0}")]
    Inference(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed outside of a provider call
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::ProviderUnavailable`] on `model`.
    pub fn unavailable(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderUnavailable {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Whether the invoker may retry this error against the fallback model.
    ///
    /// Only [`Error::ProviderUnavailable`] qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ProviderUnavailable { .. })
    }

    /// Whether this error should count as a failure against the model's breaker.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(self, Error::ProviderUnavailable { .. })
    }

    /// Whether the error should be shown to the end user as-is.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Error::BudgetExceeded { .. } | Error::InvalidInput(_) | Error::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Generic HTTP failures. Provider backends classify their own transport
/// errors as unavailability, since only they know the model involved.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("model gpt-9".to_string());
        assert_eq!(err.to_string(), "Not found: model gpt-9");
    }

    #[test]
    fn test_error_display_provider_unavailable() {
        let err = Error::unavailable("gpt-4o", "HTTP 503");
        assert_eq!(
            err.to_string(),
            "Provider unavailable for model gpt-4o: HTTP 503"
        );
    }

    #[test]
    fn test_error_display_provider_auth() {
        let err = Error::ProviderAuth {
            provider: "openai".to_string(),
            message: "invalid api key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider authentication failed (openai): invalid api key"
        );
    }

    #[test]
    fn test_error_display_dimension_mismatch() {
        let err = Error::DimensionMismatch {
            expected: 1536,
            actual: 3072,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 1536, got 3072");
    }

    #[test]
    fn test_error_display_budget_exceeded() {
        let err = Error::BudgetExceeded {
            model: "gpt-4o".to_string(),
            estimated_usd: 0.75,
            ceiling_usd: 0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("gpt-4o"));
        assert!(msg.contains("0.750000"));
        assert!(msg.contains("0.500000"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(Error::unavailable("m", "down").is_retryable());
        assert!(!Error::ProviderAuth {
            provider: "anthropic".into(),
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!Error::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_retryable());
        assert!(!Error::BudgetExceeded {
            model: "m".into(),
            estimated_usd: 1.0,
            ceiling_usd: 0.1
        }
        .is_retryable());
        assert!(!Error::Inference("bad output".into()).is_retryable());
    }

    #[test]
    fn test_auth_does_not_count_against_breaker() {
        let err = Error::ProviderAuth {
            provider: "openai".into(),
            message: "401".into(),
        };
        assert!(!err.counts_against_breaker());
        assert!(Error::unavailable("m", "timeout").counts_against_breaker());
    }

    #[test]
    fn test_budget_exceeded_is_user_visible() {
        let err = Error::BudgetExceeded {
            model: "m".into(),
            estimated_usd: 1.0,
            ceiling_usd: 0.1,
        };
        assert!(err.is_user_visible());
        assert!(!Error::Internal("x".into()).is_user_visible());
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_reqwest_error_is_request() {
        let e = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err: Error = e.into();
        assert!(matches!(err, Error::Request(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
