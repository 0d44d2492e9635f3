//! Model profiles and registry.
//!
//! The registry starts from a built-in price table for the OpenAI and
//! Anthropic models tailor routes between, then applies configuration
//! overrides once at process start. Profiles are immutable afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tailor_core::{defaults, Error, ModelKind, ModelProfile, Provider, Result};

/// Partial profile from configuration. Patches an existing profile, or
/// defines a new one when provider, costs, and context window are all set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    pub provider: Option<Provider>,
    pub kind: Option<ModelKind>,
    pub cost_input_per_mtok: Option<f64>,
    pub cost_output_per_mtok: Option<f64>,
    pub context_window: Option<usize>,
    pub embedding_dimension: Option<usize>,
    pub capability_tags: Option<Vec<String>>,
}

/// Registry of callable models keyed by id.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    profiles: HashMap<String, ModelProfile>,
}

impl ModelRegistry {
    /// Create a registry with the built-in model table.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Generation models
        registry.insert(
            ModelProfile::generation("gpt-4o", Provider::OpenAI, 2.50, 10.00, 128_000)
                .with_tags(["reasoning", "vision", "creative"]),
        );
        registry.insert(
            ModelProfile::generation("gpt-4o-mini", Provider::OpenAI, 0.15, 0.60, 128_000)
                .with_tags(["speed", "extraction"]),
        );
        registry.insert(
            ModelProfile::generation("gpt-4.1", Provider::OpenAI, 2.00, 8.00, 1_047_576)
                .with_tags(["long_context", "extraction"]),
        );
        registry.insert(
            ModelProfile::generation("claude-sonnet-4", Provider::Anthropic, 3.00, 15.00, 200_000)
                .with_tags(["reasoning", "creative", "writing"]),
        );
        registry.insert(
            ModelProfile::generation("claude-3-5-haiku", Provider::Anthropic, 0.80, 4.00, 200_000)
                .with_tags(["speed"]),
        );

        // Embedding models
        registry.insert(ModelProfile::embedding(
            "text-embedding-3-small",
            Provider::OpenAI,
            0.02,
            8_191,
            defaults::EMBED_DIMENSION_SMALL,
        ));
        registry.insert(ModelProfile::embedding(
            "text-embedding-3-large",
            Provider::OpenAI,
            0.13,
            8_191,
            defaults::EMBED_DIMENSION_LARGE,
        ));

        registry
    }

    /// Create a registry with no models.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, profile: ModelProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Get a profile by id.
    pub fn get(&self, id: &str) -> Option<&ModelProfile> {
        self.profiles.get(id)
    }

    /// Get a profile by id, treating an unknown id as a configuration error.
    pub fn require(&self, id: &str) -> Result<&ModelProfile> {
        self.get(id)
            .ok_or_else(|| Error::Config(format!("Unknown model: {}", id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// All profiles sorted by id.
    pub fn list(&self) -> Vec<&ModelProfile> {
        let mut profiles: Vec<_> = self.profiles.values().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    fn of_kind(&self, kind: ModelKind) -> impl Iterator<Item = &ModelProfile> + '_ {
        self.list().into_iter().filter(move |p| p.kind == kind)
    }

    /// Generation model with the lowest combined input and output price.
    ///
    /// Ties resolve to the lexically smallest id.
    pub fn cheapest_generation(&self) -> Option<&ModelProfile> {
        self.of_kind(ModelKind::Generation).fold(None, |best, p| match best {
            Some(b) if b.blended_cost_per_mtok() <= p.blended_cost_per_mtok() => Some(b),
            _ => Some(p),
        })
    }

    /// Generation model with the largest context window; the cheaper model
    /// wins a tie.
    pub fn long_context_generation(&self) -> Option<&ModelProfile> {
        self.of_kind(ModelKind::Generation).fold(None, |best, p| match best {
            Some(b)
                if b.context_window > p.context_window
                    || (b.context_window == p.context_window
                        && b.blended_cost_per_mtok() <= p.blended_cost_per_mtok()) =>
            {
                Some(b)
            }
            _ => Some(p),
        })
    }

    /// Embedding model with the highest output dimension.
    pub fn largest_embedding(&self) -> Option<&ModelProfile> {
        self.of_kind(ModelKind::Embedding).fold(None, |best, p| match best {
            Some(b) if b.embedding_dimension >= p.embedding_dimension => Some(b),
            _ => Some(p),
        })
    }

    /// Apply a configuration override for `id`.
    pub fn apply_override(&mut self, id: &str, ov: &ModelOverride) -> Result<()> {
        let profile = match self.profiles.get(id) {
            Some(existing) => {
                let mut p = existing.clone();
                if let Some(provider) = ov.provider {
                    p.provider = provider;
                }
                if let Some(kind) = ov.kind {
                    p.kind = kind;
                }
                if let Some(cost) = ov.cost_input_per_mtok {
                    p.cost_input_per_mtok = cost;
                }
                if let Some(cost) = ov.cost_output_per_mtok {
                    p.cost_output_per_mtok = cost;
                }
                if let Some(window) = ov.context_window {
                    p.context_window = window;
                }
                if ov.embedding_dimension.is_some() {
                    p.embedding_dimension = ov.embedding_dimension;
                }
                if let Some(ref tags) = ov.capability_tags {
                    p.capability_tags = tags.iter().cloned().collect();
                }
                p
            }
            None => {
                let (Some(provider), Some(cost_in), Some(window)) =
                    (ov.provider, ov.cost_input_per_mtok, ov.context_window)
                else {
                    return Err(Error::Config(format!(
                        "New model {} needs provider, cost_input_per_mtok and context_window",
                        id
                    )));
                };
                let kind = ov.kind.unwrap_or(ModelKind::Generation);
                let profile = match kind {
                    ModelKind::Generation => ModelProfile::generation(
                        id,
                        provider,
                        cost_in,
                        ov.cost_output_per_mtok.unwrap_or(0.0),
                        window,
                    ),
                    ModelKind::Embedding => {
                        let dimension = ov.embedding_dimension.ok_or_else(|| {
                            Error::Config(format!(
                                "Embedding model {} needs embedding_dimension",
                                id
                            ))
                        })?;
                        ModelProfile::embedding(id, provider, cost_in, window, dimension)
                    }
                };
                profile.with_tags(ov.capability_tags.iter().flatten().cloned())
            }
        };

        validate_profile(&profile)?;
        self.insert(profile);
        Ok(())
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_profile(p: &ModelProfile) -> Result<()> {
    if p.cost_input_per_mtok < 0.0 || p.cost_output_per_mtok < 0.0 {
        return Err(Error::Config(format!("Model {} has a negative cost", p.id)));
    }
    if p.context_window == 0 {
        return Err(Error::Config(format!(
            "Model {} has a zero context window",
            p.id
        )));
    }
    if p.kind == ModelKind::Embedding && p.embedding_dimension.unwrap_or(0) == 0 {
        return Err(Error::Config(format!(
            "Embedding model {} has no dimension",
            p.id
        )));
    }
    Ok(())
}
