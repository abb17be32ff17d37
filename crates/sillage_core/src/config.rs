//! Tuned engine constants grouped as named configuration.
//!
//! # Invariants
//! - `EngineConfig::default()` reproduces the shipped tuning exactly.
//! - Ranking weights are kept as given; they are not re-derived at runtime.

use serde::{Deserialize, Serialize};

/// Knobs of the combination generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub target_protocols: usize,
    /// Combinations scoring below this are discarded.
    pub min_compatibility: f64,
    /// Pair enumeration stops once this many pairs survived.
    pub pair_candidate_cap: usize,
    /// Triple enumeration stops once this many triples survived...
    pub triple_candidate_cap: usize,
    /// ...or after this many triples were tried.
    pub triple_attempt_cap: usize,
    pub application_seconds_per_step: u32,
    pub drying_seconds: u32,
    pub development_minutes: u32,
    pub spray_distance_cm: u32,
    pub longevity_multiplier: f64,
    pub peak_fraction: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            target_protocols: 500,
            min_compatibility: 45.0,
            pair_candidate_cap: 1200,
            triple_candidate_cap: 200,
            triple_attempt_cap: 1000,
            application_seconds_per_step: 5,
            drying_seconds: 45,
            development_minutes: 30,
            spray_distance_cm: 15,
            longevity_multiplier: 1.2,
            peak_fraction: 0.25,
        }
    }
}

/// Weights of the composite ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub compatibility: f64,
    /// Applied to savings normalized against the best candidate, 0..=100.
    pub savings: f64,
    pub savings_percent: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingWeights {
            compatibility: 0.60,
            savings: 0.25,
            savings_percent: 0.15,
        }
    }
}

/// Persisted key layout and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub namespace: String,
    /// Protocols per persisted chunk.
    pub chunk_size: usize,
    /// Oldest usage entries rotate out past this length.
    pub usage_history_cap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            namespace: "@sillage/v1".to_string(),
            chunk_size: 100,
            usage_history_cap: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub generator: GeneratorConfig,
    pub ranking: RankingWeights,
    pub store: StoreConfig,
}
