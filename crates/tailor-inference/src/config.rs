//! Routing configuration.
//!
//! Configuration is loaded from a TOML file (`$TAILOR_CONFIG`, default
//! `~/.config/tailor/routing.toml`) or, when no file exists, from environment
//! variables. `${VAR}` placeholders in the file are substituted from the
//! environment so API keys can stay out of it.
//!
//! ```toml
//! active_strategy = "cost_optimized"
//!
//! [breaker]
//! failure_threshold = 5
//! cooldown_secs = 60
//!
//! [timeouts]
//! generation_secs = 30
//! embedding_secs = 10
//!
//! [models.gpt-4o]
//! cost_input_per_mtok = 2.0
//!
//! [openai]
//! api_key = "${OPENAI_API_KEY}"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use tailor_core::{defaults, GenerationTier, SelectionStrategy};

use crate::anthropic::AnthropicConfig;
use crate::circuit_breaker::BreakerConfig;
use crate::openai::OpenAIConfig;
use crate::profiles::{ModelOverride, ModelRegistry};
use crate::strategy::{builtin_strategy, validate_strategy};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for tailor_core::Error {
    fn from(e: ConfigError) -> Self {
        tailor_core::Error::Config(e.to_string())
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            cooldown_secs: defaults::BREAKER_COOLDOWN_SECS,
        }
    }
}

/// Per-call deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub generation_secs: u64,
    pub embedding_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            generation_secs: defaults::GENERATION_TIMEOUT_SECS,
            embedding_secs: defaults::EMBEDDING_TIMEOUT_SECS,
        }
    }
}

/// Invocation recorder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub queue_capacity: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::RECORDER_QUEUE_CAPACITY,
        }
    }
}

/// Endpoint and credentials for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ProviderSettings {
    fn openai() -> Self {
        Self {
            base_url: defaults::OPENAI_URL.to_string(),
            api_key: None,
        }
    }

    fn anthropic() -> Self {
        Self {
            base_url: defaults::ANTHROPIC_URL.to_string(),
            api_key: None,
        }
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{} base_url must start with http:// or https://, got: {}",
                name, self.base_url
            )));
        }
        Ok(())
    }
}

/// A custom strategy defined in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyDefinition {
    pub job_parsing_model: String,
    pub cv_generation_model: String,
    pub embedding_model: String,
    pub fallback_model: String,
    pub max_cost_per_generation: f64,
    pub mid_tier_model: String,
    #[serde(default = "default_max_tier")]
    pub max_tier: GenerationTier,
}

fn default_max_tier() -> GenerationTier {
    GenerationTier::Premium
}

impl StrategyDefinition {
    fn into_strategy(self, name: &str) -> SelectionStrategy {
        SelectionStrategy {
            name: name.to_string(),
            job_parsing_model: self.job_parsing_model,
            cv_generation_model: self.cv_generation_model,
            embedding_model: self.embedding_model,
            fallback_model: self.fallback_model,
            max_cost_per_generation: self.max_cost_per_generation,
            mid_tier_model: self.mid_tier_model,
            max_tier: self.max_tier,
        }
    }
}

fn default_strategy_name() -> String {
    defaults::STRATEGY_NAME.to_string()
}

/// Complete routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_strategy_name")]
    pub active_strategy: String,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub recorder: RecorderSettings,
    /// Per-model cost and capability overrides.
    #[serde(default)]
    pub models: BTreeMap<String, ModelOverride>,
    /// Custom strategies, by name. These shadow built-ins of the same name.
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyDefinition>,
    #[serde(default = "ProviderSettings::openai")]
    pub openai: ProviderSettings,
    #[serde(default = "ProviderSettings::anthropic")]
    pub anthropic: ProviderSettings,
    #[serde(default, skip_serializing)]
    pub database_url: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            active_strategy: default_strategy_name(),
            breaker: BreakerSettings::default(),
            timeouts: TimeoutSettings::default(),
            recorder: RecorderSettings::default(),
            models: BTreeMap::new(),
            strategies: BTreeMap::new(),
            openai: ProviderSettings::openai(),
            anthropic: ProviderSettings::anthropic(),
            database_url: None,
        }
    }
}

impl RoutingConfig {
    /// Config file path: `$TAILOR_CONFIG`, else `~/.config/tailor/routing.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Ok(path) = env::var("TAILOR_CONFIG") {
            return PathBuf::from(path);
        }
        let mut path = env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        path.push(".config");
        path.push("tailor");
        path.push("routing.toml");
        path
    }

    /// Load from the default path, falling back to environment variables.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::default_config_path();

        if path.exists() {
            info!(subsystem = "config", path = %path.display(), "Loading routing config");
            let mut config = Self::from_file(&path)?;
            config.fill_secrets_from_env(|k| env::var(k).ok());
            Ok(config)
        } else {
            debug!(
                subsystem = "config",
                path = %path.display(),
                "Config file not found, using environment variables"
            );
            Self::from_env()
        }
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML content.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let content = substitute_env_vars(content);
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let mut config = Self {
            active_strategy: lookup("TAILOR_STRATEGY").unwrap_or(d.active_strategy),
            breaker: BreakerSettings {
                failure_threshold: parse_var(
                    &lookup,
                    "TAILOR_BREAKER_THRESHOLD",
                    d.breaker.failure_threshold,
                )?,
                cooldown_secs: parse_var(
                    &lookup,
                    "TAILOR_BREAKER_COOLDOWN_SECS",
                    d.breaker.cooldown_secs,
                )?,
            },
            timeouts: TimeoutSettings {
                generation_secs: parse_var(
                    &lookup,
                    "TAILOR_GENERATION_TIMEOUT_SECS",
                    d.timeouts.generation_secs,
                )?,
                embedding_secs: parse_var(
                    &lookup,
                    "TAILOR_EMBEDDING_TIMEOUT_SECS",
                    d.timeouts.embedding_secs,
                )?,
            },
            recorder: RecorderSettings {
                queue_capacity: parse_var(
                    &lookup,
                    "TAILOR_RECORDER_CAPACITY",
                    d.recorder.queue_capacity,
                )?,
            },
            models: BTreeMap::new(),
            strategies: BTreeMap::new(),
            openai: ProviderSettings {
                base_url: lookup("OPENAI_BASE_URL").unwrap_or(d.openai.base_url),
                api_key: None,
            },
            anthropic: ProviderSettings {
                base_url: lookup("ANTHROPIC_BASE_URL").unwrap_or(d.anthropic.base_url),
                api_key: None,
            },
            database_url: None,
        };
        config.fill_secrets_from_env(&lookup);
        config.validate()?;
        Ok(config)
    }

    /// Fill API keys and the database URL from the environment when the file
    /// left them unset.
    fn fill_secrets_from_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.openai.api_key.is_none() {
            self.openai.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());
        }
        if self.anthropic.api_key.is_none() {
            self.anthropic.api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty());
        }
        if self.database_url.is_none() {
            self.database_url = lookup("DATABASE_URL").filter(|u| !u.is_empty());
        }
    }

    /// Check value ranges and URLs.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.active_strategy.trim().is_empty() {
            return Err(ConfigError::Validation(
                "active_strategy cannot be empty".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.timeouts.generation_secs == 0 || self.timeouts.embedding_secs == 0 {
            return Err(ConfigError::Validation(
                "timeouts must be positive".to_string(),
            ));
        }
        if self.recorder.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "recorder.queue_capacity must be positive".to_string(),
            ));
        }
        self.openai.validate("openai")?;
        self.anthropic.validate("anthropic")?;
        Ok(())
    }

    /// Build the model registry: built-in table plus `[models.*]` overrides.
    pub fn build_registry(&self) -> ConfigResult<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        for (id, ov) in &self.models {
            registry
                .apply_override(id, ov)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        Ok(registry)
    }

    /// Resolve a strategy by name: custom definitions first, then built-ins.
    pub fn strategy(&self, name: &str, registry: &ModelRegistry) -> ConfigResult<SelectionStrategy> {
        let strategy = match self.strategies.get(name) {
            Some(def) => def.clone().into_strategy(name),
            None => builtin_strategy(name)
                .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))?,
        };
        validate_strategy(&strategy, registry)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(strategy)
    }

    /// Resolve the active strategy.
    pub fn active(&self, registry: &ModelRegistry) -> ConfigResult<SelectionStrategy> {
        self.strategy(&self.active_strategy, registry)
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Duration::from_secs(self.breaker.cooldown_secs),
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.generation_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.embedding_secs)
    }

    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfig {
            base_url: self.openai.base_url.clone(),
            api_key: self.openai.api_key.clone(),
            ..Default::default()
        }
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            base_url: self.anthropic.base_url.clone(),
            api_key: self.anthropic.api_key.clone(),
            ..Default::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
///
/// Unset variables are left as-is.
fn substitute_env_vars(content: &str) -> String {
    static PLACEHOLDER: once_cell::sync::Lazy<Option<regex::Regex>> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").ok());

    let Some(re) = PLACEHOLDER.as_ref() else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .to_string()
}
