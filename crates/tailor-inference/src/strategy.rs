//! Built-in selection strategies and the active-strategy store.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use tailor_core::{defaults, Error, GenerationTier, ModelKind, Result, SelectionStrategy};

use crate::profiles::ModelRegistry;

/// Names of the built-in strategies.
pub const BUILTIN_STRATEGIES: [&str; 3] = ["quality_optimized", "balanced", "cost_optimized"];

/// Look up a built-in strategy by name.
pub fn builtin_strategy(name: &str) -> Option<SelectionStrategy> {
    let strategy = match name {
        "quality_optimized" => SelectionStrategy {
            name: name.to_string(),
            job_parsing_model: "gpt-4o".to_string(),
            cv_generation_model: "claude-sonnet-4".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            fallback_model: "gpt-4o".to_string(),
            max_cost_per_generation: 1.00,
            mid_tier_model: "gpt-4o".to_string(),
            max_tier: GenerationTier::Premium,
        },
        "balanced" => SelectionStrategy {
            name: name.to_string(),
            job_parsing_model: "gpt-4o-mini".to_string(),
            cv_generation_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            fallback_model: "gpt-4o-mini".to_string(),
            max_cost_per_generation: defaults::MAX_COST_PER_GENERATION_USD,
            mid_tier_model: "gpt-4o-mini".to_string(),
            max_tier: GenerationTier::Premium,
        },
        "cost_optimized" => SelectionStrategy {
            name: name.to_string(),
            job_parsing_model: "gpt-4o-mini".to_string(),
            cv_generation_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            fallback_model: "claude-3-5-haiku".to_string(),
            max_cost_per_generation: 0.10,
            mid_tier_model: "gpt-4o-mini".to_string(),
            max_tier: GenerationTier::Mid,
        },
        _ => return None,
    };
    Some(strategy)
}

/// Check that every model a strategy names exists in the registry with the
/// right kind, and that the cost ceiling is usable.
pub fn validate_strategy(strategy: &SelectionStrategy, registry: &ModelRegistry) -> Result<()> {
    for id in strategy.referenced_models() {
        registry.require(id)?;
    }

    let embed = registry.require(&strategy.embedding_model)?;
    if embed.kind != ModelKind::Embedding {
        return Err(Error::Config(format!(
            "Strategy {}: embedding_model {} is not an embedding model",
            strategy.name, embed.id
        )));
    }

    for id in [
        &strategy.job_parsing_model,
        &strategy.cv_generation_model,
        &strategy.fallback_model,
        &strategy.mid_tier_model,
    ] {
        if registry.require(id)?.kind != ModelKind::Generation {
            return Err(Error::Config(format!(
                "Strategy {}: {} is not a generation model",
                strategy.name, id
            )));
        }
    }

    if !(strategy.max_cost_per_generation > 0.0) {
        return Err(Error::Config(format!(
            "Strategy {}: max_cost_per_generation must be positive",
            strategy.name
        )));
    }
    Ok(())
}

/// Holder of the single active strategy.
///
/// Readers take a cheap `Arc` snapshot; a reload replaces the whole value, so
/// in-flight requests keep the strategy they started with.
#[derive(Debug)]
pub struct StrategyStore {
    active: RwLock<Arc<SelectionStrategy>>,
}

impl StrategyStore {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            active: RwLock::new(Arc::new(strategy)),
        }
    }

    /// Snapshot of the active strategy.
    pub fn current(&self) -> Arc<SelectionStrategy> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active strategy, returning the previous one.
    pub fn swap(&self, strategy: SelectionStrategy) -> Arc<SelectionStrategy> {
        let next = Arc::new(strategy);
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        info!(
            subsystem = "selector",
            strategy = %guard.name,
            previous = %previous.name,
            "Active strategy swapped"
        );
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_exist_and_validate() {
        let registry = ModelRegistry::new();
        for name in BUILTIN_STRATEGIES {
            let strategy = builtin_strategy(name).unwrap();
            assert_eq!(strategy.name, name);
            validate_strategy(&strategy, &registry).unwrap();
        }
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin_strategy("yolo").is_none());
    }

    #[test]
    fn test_tier_policy_table() {
        let quality = builtin_strategy("quality_optimized").unwrap();
        assert_eq!(quality.cv_generation_model, "claude-sonnet-4");
        assert_eq!(quality.mid_tier_model, "gpt-4o");
        assert_eq!(quality.max_tier, GenerationTier::Premium);

        let balanced = builtin_strategy("balanced").unwrap();
        assert_eq!(balanced.cv_generation_model, "gpt-4o");
        assert_eq!(balanced.mid_tier_model, "gpt-4o-mini");

        let cost = builtin_strategy("cost_optimized").unwrap();
        assert_eq!(cost.max_tier, GenerationTier::Mid);
        assert_eq!(cost.cv_generation_model, "gpt-4o-mini");
    }

    #[test]
    fn test_validate_rejects_unknown_model() {
        let registry = ModelRegistry::new();
        let mut strategy = builtin_strategy("balanced").unwrap();
        strategy.fallback_model = "gpt-9".to_string();
        assert!(matches!(
            validate_strategy(&strategy, &registry),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let registry = ModelRegistry::new();
        let mut strategy = builtin_strategy("balanced").unwrap();
        strategy.embedding_model = "gpt-4o".to_string();
        assert!(validate_strategy(&strategy, &registry).is_err());

        let mut strategy = builtin_strategy("balanced").unwrap();
        strategy.cv_generation_model = "text-embedding-3-large".to_string();
        assert!(validate_strategy(&strategy, &registry).is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_ceiling() {
        let registry = ModelRegistry::new();
        let mut strategy = builtin_strategy("balanced").unwrap();
        strategy.max_cost_per_generation = 0.0;
        assert!(validate_strategy(&strategy, &registry).is_err());
        strategy.max_cost_per_generation = f64::NAN;
        assert!(validate_strategy(&strategy, &registry).is_err());
    }

    #[test]
    fn test_store_swap_keeps_old_snapshot() {
        let store = StrategyStore::new(builtin_strategy("balanced").unwrap());
        let before = store.current();

        let previous = store.swap(builtin_strategy("cost_optimized").unwrap());

        assert_eq!(previous.name, "balanced");
        assert_eq!(before.name, "balanced");
        assert_eq!(store.current().name, "cost_optimized");
    }

    #[test]
    fn test_store_concurrent_readers() {
        let store = Arc::new(StrategyStore::new(builtin_strategy("balanced").unwrap()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    if i % 4 == 0 {
                        store.swap(builtin_strategy("quality_optimized").unwrap());
                    }
                    let s = store.current();
                    assert!(BUILTIN_STRATEGIES.contains(&s.name.as_str()));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
