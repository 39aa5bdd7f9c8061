//! evo-stream - Streaming evolutionary optimization for live actors.
//!
//! This crate tunes the parameters of many concurrently living actors (game
//! agents, simulated creatures) without ever stalling the loop that drives them.
//! Genotypes are sampled from a per-species pool, fitness is reported whenever an
//! actor dies, and a background task evolves the pool in small time-bounded steps.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, population and persistence types
//! - `compute`: Evolution engines (synchronous and streaming) and actor tracking
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use evo_stream::{
//!     compute::{SpeciesRegistry, WeightedAggregator},
//!     schema::{GeneBounds, MetricBundle, SpeciesConfig, SpeciesId},
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SpeciesRegistry::new();
//! let species = SpeciesConfig::uniform(SpeciesId(1), "walker", 4, GeneBounds::new(0.0, 1.0));
//! let weights = [("avg_speed".to_string(), 1.0)].into_iter().collect();
//! registry.register(species, Arc::new(WeightedAggregator::new(weights)))?;
//! registry.start()?;
//!
//! let (genes, eval) = registry.sample(SpeciesId(1))?;
//! registry.begin_tracking(SpeciesId(1), eval)?;
//! // Every simulation tick:
//! let tick: MetricBundle = [("speed".to_string(), genes[0])].into_iter().collect();
//! registry.collect_metrics(SpeciesId(1), eval, &tick, 1.0 / 60.0)?;
//! // When the actor dies:
//! let fitness = registry.complete_tracking(SpeciesId(1), eval, &MetricBundle::new(), None)?;
//! println!("Fitness: {:?}", fitness);
//! # Ok(())
//! # }
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{SpeciesRegistry, StreamingEngine, SyncEngine, WeightedAggregator};
pub use schema::{Candidate, EvalId, Pool, PoolStats, SpeciesConfig, SpeciesId};
