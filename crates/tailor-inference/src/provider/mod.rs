//! Provider dispatch.
//!
//! The registry holds one backend per [`Provider`] and hands out the backend
//! that serves a model's profile.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use tailor_core::{Error, ModelProfile, Provider, ProviderBackend, Result};

use crate::anthropic::AnthropicBackend;
use crate::config::RoutingConfig;
use crate::openai::OpenAIBackend;

/// Backends keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: HashMap<Provider, Arc<dyn ProviderBackend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the OpenAI and Anthropic backends from configuration.
    ///
    /// A provider without an API key is still registered; its calls fail
    /// with an authentication error from the provider.
    pub fn from_config(config: &RoutingConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAIBackend::new(config.openai_config())?));
        registry.register(Arc::new(AnthropicBackend::new(config.anthropic_config())?));
        Ok(registry)
    }

    /// Register `backend`, replacing any previous backend for its provider.
    pub fn register(&mut self, backend: Arc<dyn ProviderBackend>) -> &mut Self {
        let provider = backend.provider();
        info!(subsystem = "provider", provider = %provider, "Registered provider backend");
        self.backends.insert(provider, backend);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderBackend>> {
        self.backends
            .get(&provider)
            .cloned()
            .ok_or_else(|| Error::Config(format!("No backend registered for provider {}", provider)))
    }

    /// Backend serving `profile`.
    pub fn for_model(&self, profile: &ModelProfile) -> Result<Arc<dyn ProviderBackend>> {
        self.get(profile.provider)
    }

    /// Registered providers, sorted by name.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.backends.keys().copied().collect();
        providers.sort_by_key(|p| p.to_string());
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedBackend;

    #[test]
    fn test_missing_provider_is_config_error() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get(Provider::Anthropic),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_register_replaces_previous_backend() {
        let first = Arc::new(ScriptedBackend::new(Provider::OpenAI));
        let second = Arc::new(ScriptedBackend::new(Provider::OpenAI));
        let mut registry = ProviderRegistry::new();
        registry.register(first).register(second.clone());

        assert_eq!(registry.providers(), vec![Provider::OpenAI]);
        let backend = registry.get(Provider::OpenAI).unwrap();
        assert!(Arc::ptr_eq(
            &backend,
            &(second as Arc<dyn ProviderBackend>)
        ));
    }

    #[test]
    fn test_from_config_registers_both_providers() {
        let registry = ProviderRegistry::from_config(&RoutingConfig::default()).unwrap();
        assert_eq!(
            registry.providers(),
            vec![Provider::Anthropic, Provider::OpenAI]
        );
    }
}
