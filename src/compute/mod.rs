//! Compute module - Evolution engines and live actor tracking.

pub mod evolution;
pub mod tracking;

pub use evolution::{StreamingEngine, SyncEngine};
pub use tracking::{SpeciesRegistry, WeightedAggregator};
