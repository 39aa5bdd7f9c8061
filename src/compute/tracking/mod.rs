//! Live actor tracking: metric collection, fitness aggregation and the species registry.
//!
//! - **Collector** (`collector`): Per-evaluation running statistics, pooled for reuse
//! - **Fitness** (`fitness`): Weighted, normalized and context-adjusted scoring
//! - **Registry** (`registry`): One streaming engine per species, plus persistence

mod collector;
mod fitness;
mod registry;

pub use collector::{CollectorPool, MetricCollector, RunningStat};
pub use fitness::{FitnessAggregator, FitnessContext, WeightAdjuster, WeightedAggregator};
pub use registry::{Decoder, RegistryError, SpeciesRegistry, TrackedSpecies};
