//! Configuration for the arena driver binary.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{
    AggregatorConfig, ConfigError, ContextWeight, GeneBounds, Normalizer, SpeciesConfig, SpeciesId,
};

/// One species and how its actors are scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesEntry {
    pub species: SpeciesConfig,
    pub fitness: AggregatorConfig,
}

/// A synthetic arena: fixed-size groups of actors per species, each living a fixed
/// number of ticks before it is scored and replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub species: Vec<SpeciesEntry>,
    /// Live actors kept per species.
    #[serde(default = "default_actors_per_species")]
    pub actors_per_species: usize,
    /// Ticks each actor lives.
    #[serde(default = "default_lifetime_ticks")]
    pub lifetime_ticks: u64,
    /// Total simulation ticks.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Seconds per tick.
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Directory for persisted populations; nothing is saved when unset.
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    /// Seed for the arena's own randomness.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_actors_per_species() -> usize {
    8
}
fn default_lifetime_ticks() -> u64 {
    120
}
fn default_ticks() -> u64 {
    12_000
}
fn default_dt() -> f64 {
    1.0 / 60.0
}

impl Default for ArenaConfig {
    fn default() -> Self {
        let species = SpeciesConfig::uniform(SpeciesId(1), "walker", 4, GeneBounds::new(0.0, 1.0));
        let fitness = AggregatorConfig {
            weights: HashMap::from([
                ("avg_proximity".to_string(), 1.0),
                ("time_on_target".to_string(), 0.5),
            ]),
            normalizers: HashMap::from([(
                "time_on_target".to_string(),
                Normalizer::Cap { max: 2.0 },
            )]),
            context_weights: vec![ContextWeight {
                signal: "difficulty".to_string(),
                metric: "time_on_target".to_string(),
                gain: 1.0,
            }],
        };

        Self {
            species: vec![SpeciesEntry { species, fitness }],
            actors_per_species: default_actors_per_species(),
            lifetime_ticks: default_lifetime_ticks(),
            ticks: default_ticks(),
            dt: default_dt(),
            save_dir: None,
            seed: None,
        }
    }
}

/// Arena configuration errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ArenaConfigError {
    #[error("Arena has no species")]
    NoSpecies,
    #[error("Actors per species must be positive")]
    NoActors,
    #[error("Actor lifetime must be at least one tick")]
    NoLifetime,
    #[error("Tick length must be positive and finite, got {0}")]
    InvalidDt(f64),
    #[error("Species {0} appears more than once")]
    DuplicateSpecies(SpeciesId),
    #[error("Species '{name}': {source}")]
    Species { name: String, source: ConfigError },
}

impl ArenaConfig {
    pub fn validate(&self) -> Result<(), ArenaConfigError> {
        if self.species.is_empty() {
            return Err(ArenaConfigError::NoSpecies);
        }
        if self.actors_per_species == 0 {
            return Err(ArenaConfigError::NoActors);
        }
        if self.lifetime_ticks == 0 {
            return Err(ArenaConfigError::NoLifetime);
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ArenaConfigError::InvalidDt(self.dt));
        }

        let mut seen = HashSet::new();
        for entry in &self.species {
            let species = &entry.species;
            if !seen.insert(species.id) {
                return Err(ArenaConfigError::DuplicateSpecies(species.id));
            }
            species
                .validate()
                .map_err(|source| ArenaConfigError::Species {
                    name: species.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        assert_eq!(ArenaConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "species": [{
                "species": {
                    "id": 3,
                    "name": "crawler",
                    "gene_count": 2,
                    "bounds": [{"min": 0.0, "max": 1.0}, {"min": -5.0, "max": 5.0}]
                },
                "fitness": {"weights": {"avg_proximity": 1.0}}
            }]
        }"#;
        let config: ArenaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.actors_per_species, 8);
        assert_eq!(config.lifetime_ticks, 120);
        assert_eq!(config.species[0].species.id, SpeciesId(3));
        assert_eq!(config.species[0].species.engine.engine.pool_size, 32);
        assert_eq!(config.species[0].species.perturbation_std_dev, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_species() {
        let mut config = ArenaConfig::default();
        config.species.push(config.species[0].clone());
        assert_eq!(
            config.validate(),
            Err(ArenaConfigError::DuplicateSpecies(SpeciesId(1)))
        );
    }

    #[test]
    fn test_invalid_species_reports_name() {
        let mut config = ArenaConfig::default();
        config.species[0].species.gene_count = 7;
        assert!(matches!(
            config.validate(),
            Err(ArenaConfigError::Species { name, source: ConfigError::GeneCountMismatch { .. } })
                if name == "walker"
        ));
    }

    #[test]
    fn test_invalid_dt() {
        let config = ArenaConfig {
            dt: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ArenaConfigError::InvalidDt(0.0)));
    }
}
