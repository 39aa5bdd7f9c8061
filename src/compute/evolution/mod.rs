//! Evolutionary engines for tuning actor parameters.
//!
//! # Overview
//!
//! - **Operators** (`genome`): Pluggable initialization, selection, crossover and mutation
//! - **Synchronous Engine** (`search`): Evaluate the whole pool, then breed the next one
//! - **Streaming Engine** (`streaming`): Non-blocking steady-state evolution driven by
//!   asynchronous fitness reports
//! - **Archive** (`archive`): Population persistence
//!
//! # Example
//!
//! ```rust,no_run
//! use evo_stream::compute::evolution::{Operators, StreamingEngine};
//! use evo_stream::schema::{GeneBounds, StreamingConfig};
//!
//! # async fn run() {
//! let config = StreamingConfig::default();
//! let bounds = vec![GeneBounds::new(0.0, 1.0); 4];
//! let operators = Operators::real_valued(&bounds, 0.1, &config.engine).unwrap();
//! let engine: StreamingEngine<Vec<f64>, f64> = StreamingEngine::new(config, operators);
//! engine.start().unwrap();
//!
//! let genotype = engine.sample_population(1).remove(0);
//! let id = engine.begin_evaluation(genotype);
//! // ... the actor lives and dies ...
//! engine.complete_evaluation(id, 0.8);
//! # }
//! ```

mod archive;
mod genome;
mod search;
mod streaming;

pub use archive::{JsonArchive, PopulationStore, StoreError};
pub use genome::{
    Combiner, GaussianPerturbator, Initializer, Operators, Perturbator, Selector,
    TournamentSelector, UniformCrossover, UniformInitializer, gene_distance,
    normalized_diversity,
};
pub use search::{SearchError, SearchResult, StopReason, SyncEngine, TerminationFn};
pub use streaming::{EngineError, EngineMetrics, EngineMetricsSnapshot, StreamingEngine};
