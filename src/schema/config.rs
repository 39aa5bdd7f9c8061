//! Configuration types for evolutionary engines and tracked species.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inclusive value range for a single gene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneBounds {
    pub min: f64,
    pub max: f64,
}

impl GeneBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the range.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Center of the range, used as the fallback gene value.
    pub fn midpoint(&self) -> f64 {
        self.min + self.span() * 0.5
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Identifier of a species of actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(pub u32);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "species#{}", self.0)
    }
}

/// Settings shared by the synchronous and streaming engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of candidates in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Best candidates preserved across a structural evolution step.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Per-gene mutation probability (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Candidates drawn per tournament.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Probability of taking a gene from the first parent during crossover.
    #[serde(default = "default_mix_probability")]
    pub mix_probability: f64,
    /// Generations run by the synchronous engine.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Worker threads used for synchronous initialization and evaluation.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            elite_count: default_elite_count(),
            mutation_rate: default_mutation_rate(),
            tournament_size: default_tournament_size(),
            mix_probability: default_mix_probability(),
            max_iterations: default_max_iterations(),
            max_workers: default_max_workers(),
            random_seed: None,
        }
    }
}

fn default_pool_size() -> usize {
    32
}
fn default_elite_count() -> usize {
    2
}
fn default_mutation_rate() -> f64 {
    0.1
}
fn default_tournament_size() -> usize {
    3
}
fn default_mix_probability() -> f64 {
    0.5
}
fn default_max_iterations() -> usize {
    50
}
fn default_max_workers() -> usize {
    4
}

/// Streaming engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    /// Wall-clock allowance for one budgeted evolution step, in microseconds.
    #[serde(default = "default_tick_budget_us")]
    pub tick_budget_us: u64,
    /// Capacity of the bounded outcome channel.
    #[serde(default = "default_outcome_capacity")]
    pub outcome_capacity: usize,
    /// Outcomes consumed before a budgeted evolution step runs.
    #[serde(default = "default_min_outcomes_per_gen")]
    pub min_outcomes_per_gen: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            tick_budget_us: default_tick_budget_us(),
            outcome_capacity: default_outcome_capacity(),
            min_outcomes_per_gen: default_min_outcomes_per_gen(),
        }
    }
}

fn default_tick_budget_us() -> u64 {
    2_000
}
fn default_outcome_capacity() -> usize {
    256
}
fn default_min_outcomes_per_gen() -> usize {
    4
}

impl StreamingConfig {
    pub fn tick_budget(&self) -> Duration {
        Duration::from_micros(self.tick_budget_us)
    }
}

/// Configuration of one evolving species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub id: SpeciesId,
    /// Name, also used as the persistence key.
    pub name: String,
    pub gene_count: usize,
    /// Per-gene bounds; must have exactly `gene_count` entries.
    pub bounds: Vec<GeneBounds>,
    /// Gaussian perturbation scale, relative to each gene's span.
    #[serde(default = "default_perturbation_std_dev")]
    pub perturbation_std_dev: f64,
    #[serde(default)]
    pub engine: StreamingConfig,
}

fn default_perturbation_std_dev() -> f64 {
    0.1
}

impl SpeciesConfig {
    /// Species with uniform bounds on every gene.
    pub fn uniform(
        id: SpeciesId,
        name: impl Into<String>,
        gene_count: usize,
        bounds: GeneBounds,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            gene_count,
            bounds: vec![bounds; gene_count],
            perturbation_std_dev: default_perturbation_std_dev(),
            engine: StreamingConfig::default(),
        }
    }

    /// Genotype made of every gene's bound midpoint.
    pub fn midpoint_genes(&self) -> Vec<f64> {
        self.bounds.iter().map(GeneBounds::midpoint).collect()
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Pool size must be at least 2, got {0}")]
    PoolTooSmall(usize),
    #[error("Elite count {elite} must be smaller than pool size {pool}")]
    TooManyElites { elite: usize, pool: usize },
    #[error("Tournament size must be positive")]
    EmptyTournament,
    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Worker count must be positive")]
    NoWorkers,
    #[error("Outcome channel capacity must be positive")]
    NoOutcomeCapacity,
    #[error("Minimum outcomes per generation must be positive")]
    NoOutcomesPerGen,
    #[error("Gene count {gene_count} does not match {bounds} bounds")]
    GeneCountMismatch { gene_count: usize, bounds: usize },
    #[error("Invalid bounds for gene {index}: [{min}, {max}]")]
    InvalidBounds { index: usize, min: f64, max: f64 },
    #[error("Perturbation standard deviation must be non-negative, got {0}")]
    InvalidStdDev(f64),
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size < 2 {
            return Err(ConfigError::PoolTooSmall(self.pool_size));
        }
        if self.elite_count >= self.pool_size {
            return Err(ConfigError::TooManyElites {
                elite: self.elite_count,
                pool: self.pool_size,
            });
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::EmptyTournament);
        }
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        check_probability("mutation_rate", self.mutation_rate)?;
        check_probability("mix_probability", self.mix_probability)?;
        Ok(())
    }
}

impl StreamingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.outcome_capacity == 0 {
            return Err(ConfigError::NoOutcomeCapacity);
        }
        if self.min_outcomes_per_gen == 0 {
            return Err(ConfigError::NoOutcomesPerGen);
        }
        Ok(())
    }
}

impl SpeciesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gene_count != self.bounds.len() {
            return Err(ConfigError::GeneCountMismatch {
                gene_count: self.gene_count,
                bounds: self.bounds.len(),
            });
        }
        validate_bounds(&self.bounds)?;
        if self.perturbation_std_dev.is_nan() || self.perturbation_std_dev < 0.0 {
            return Err(ConfigError::InvalidStdDev(self.perturbation_std_dev));
        }
        self.engine.validate()
    }
}

/// Check that every bound is finite and ordered.
pub fn validate_bounds(bounds: &[GeneBounds]) -> Result<(), ConfigError> {
    for (index, b) in bounds.iter().enumerate() {
        if !b.min.is_finite() || !b.max.is_finite() || b.min > b.max {
            return Err(ConfigError::InvalidBounds {
                index,
                min: b.min,
                max: b.max,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(StreamingConfig::default().validate().is_ok());
        let species = SpeciesConfig::uniform(SpeciesId(1), "walker", 3, GeneBounds::new(0.0, 1.0));
        assert!(species.validate().is_ok());
    }

    #[test]
    fn test_gene_count_mismatch() {
        let mut species =
            SpeciesConfig::uniform(SpeciesId(1), "walker", 3, GeneBounds::new(0.0, 1.0));
        species.bounds.truncate(1);
        assert_eq!(
            species.validate(),
            Err(ConfigError::GeneCountMismatch {
                gene_count: 3,
                bounds: 1
            })
        );
    }

    #[test]
    fn test_inverted_bounds() {
        let species = SpeciesConfig::uniform(SpeciesId(1), "walker", 2, GeneBounds::new(1.0, 0.0));
        assert!(matches!(
            species.validate(),
            Err(ConfigError::InvalidBounds { index: 0, .. })
        ));
    }

    #[test]
    fn test_elites_must_leave_room() {
        let config = EngineConfig {
            pool_size: 4,
            elite_count: 4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyElites { .. })
        ));
    }

    #[test]
    fn test_bounds_helpers() {
        let b = GeneBounds::new(-2.0, 6.0);
        assert_eq!(b.span(), 8.0);
        assert_eq!(b.midpoint(), 2.0);
        assert_eq!(b.clamp(10.0), 6.0);
        assert!(b.contains(-2.0));
        assert!(!b.contains(6.5));
    }

    #[test]
    fn test_serialization_defaults() {
        let json = r#"{"id": 7, "name": "crawler", "gene_count": 1, "bounds": [{"min": 0.0, "max": 2.0}]}"#;
        let parsed: SpeciesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, SpeciesId(7));
        assert_eq!(parsed.engine.engine.pool_size, 32);
        assert_eq!(parsed.engine.min_outcomes_per_gen, 4);
        assert_eq!(parsed.perturbation_std_dev, 0.1);
    }
}
