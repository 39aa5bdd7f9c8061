//! Per-species engines, metric tracking and persistence.
//!
//! A [`SpeciesRegistry`] is the entry point a simulation loop talks to. For every
//! actor it samples a genotype, wraps the actor's life in a pooled
//! [`MetricCollector`], scores the finalized metrics with the species'
//! aggregator and reports the score to the species' streaming engine.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rand::prelude::*;

use crate::compute::evolution::{
    EngineError, Initializer, Operators, PopulationStore, StoreError, StreamingEngine,
    UniformInitializer, normalized_diversity,
};
use crate::schema::{
    Candidate, ConfigError, EvalId, MetricBundle, Pool, PoolStats, PopulationDto, SpeciesConfig,
    SpeciesId,
};

use super::collector::{CollectorPool, MetricCollector};
use super::fitness::{FitnessAggregator, FitnessContext};

/// Idle collectors kept for reuse across all species.
const MAX_IDLE_COLLECTORS: usize = 256;

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid species config: {0}")]
    Config(#[from] ConfigError),
    #[error("Species {0} is already registered")]
    DuplicateSpecies(SpeciesId),
    #[error("Unknown species {0}")]
    UnknownSpecies(SpeciesId),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Genotype to domain-specific phenotype.
pub trait Decoder<P> {
    fn decode(&self, genes: &[f64]) -> P;
}

impl<P, D> Decoder<P> for D
where
    D: Fn(&[f64]) -> P,
{
    fn decode(&self, genes: &[f64]) -> P {
        self(genes)
    }
}

/// One registered species.
pub struct TrackedSpecies {
    pub config: SpeciesConfig,
    pub engine: StreamingEngine<Vec<f64>, f64>,
    aggregator: Arc<dyn FitnessAggregator>,
    trackers: Mutex<HashMap<EvalId, MetricCollector>>,
}

impl TrackedSpecies {
    fn new(
        config: SpeciesConfig,
        aggregator: Arc<dyn FitnessAggregator>,
    ) -> Result<Self, ConfigError> {
        let operators = Operators::real_valued(
            &config.bounds,
            config.perturbation_std_dev,
            &config.engine.engine,
        )?;
        let engine = StreamingEngine::new(config.engine.clone(), operators);
        Ok(Self {
            config,
            engine,
            aggregator,
            trackers: Mutex::new(HashMap::new()),
        })
    }

    /// Evaluations with a live collector.
    pub fn active_trackers(&self) -> usize {
        self.trackers.lock().len()
    }
}

/// Owns every species and the shared collector pool.
pub struct SpeciesRegistry {
    species: RwLock<HashMap<SpeciesId, Arc<TrackedSpecies>>>,
    store: Option<Arc<dyn PopulationStore>>,
    collectors: CollectorPool,
}

impl Default for SpeciesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeciesRegistry {
    /// Registry without persistence.
    pub fn new() -> Self {
        Self {
            species: RwLock::new(HashMap::new()),
            store: None,
            collectors: CollectorPool::new(MAX_IDLE_COLLECTORS),
        }
    }

    /// Registry that loads on `start` and saves on `save_all`.
    pub fn with_store(store: Arc<dyn PopulationStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Add a species. On error the registry is left unchanged.
    pub fn register(
        &self,
        config: SpeciesConfig,
        aggregator: Arc<dyn FitnessAggregator>,
    ) -> Result<(), RegistryError> {
        config.validate()?;

        let mut species = self.species.write();
        if species.contains_key(&config.id) {
            return Err(RegistryError::DuplicateSpecies(config.id));
        }
        debug!(
            "Registered {} '{}' ({} genes)",
            config.id, config.name, config.gene_count
        );
        let id = config.id;
        let tracked = TrackedSpecies::new(config, aggregator)?;
        species.insert(id, Arc::new(tracked));
        Ok(())
    }

    pub fn contains(&self, id: SpeciesId) -> bool {
        self.species.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.species.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.read().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<SpeciesId> {
        let mut ids: Vec<_> = self.species.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: SpeciesId) -> Option<Arc<TrackedSpecies>> {
        self.species.read().get(&id).cloned()
    }

    fn lookup(&self, id: SpeciesId) -> Result<Arc<TrackedSpecies>, RegistryError> {
        self.get(id).ok_or(RegistryError::UnknownSpecies(id))
    }

    /// Restore persisted populations, then start every engine.
    ///
    /// A population that cannot be loaded is treated as absent. Engines that are already
    /// running or already hold a pool keep it, so calling `start` again never rolls back.
    pub fn start(&self) -> Result<(), RegistryError> {
        let all: Vec<_> = self.species.read().values().cloned().collect();
        for tracked in all {
            let fresh = !tracked.engine.is_running() && tracked.engine.snapshot().is_none();
            if fresh && let Some(store) = &self.store {
                match store.load(&tracked.config.name) {
                    Ok(dto) if !dto.is_empty() => {
                        let pool = restore_pool(dto, &tracked.config);
                        info!(
                            "Restored '{}' at generation {}",
                            tracked.config.name, pool.generation
                        );
                        tracked.engine.set_pool(pool)?;
                    }
                    Ok(_) => {}
                    Err(StoreError::NotFound(name)) => {
                        info!("No saved population for '{}'", name);
                    }
                    Err(e) => {
                        warn!(
                            "Could not load population for '{}': {}",
                            tracked.config.name, e
                        );
                    }
                }
            }
            tracked.engine.start()?;
        }
        Ok(())
    }

    /// Signal every engine to stop.
    pub fn stop(&self) {
        for tracked in self.species.read().values() {
            tracked.engine.stop();
        }
    }

    /// Stop every engine and wait for the background tasks to exit.
    pub async fn shutdown(&self) {
        let all: Vec<_> = self.species.read().values().cloned().collect();
        for tracked in all {
            tracked.engine.shutdown().await;
        }
    }

    /// Draw a genotype and open an evaluation for it.
    ///
    /// With no population yet, returns the bound midpoints and [`EvalId::NONE`].
    pub fn sample(&self, id: SpeciesId) -> Result<(Vec<f64>, EvalId), RegistryError> {
        let tracked = self.lookup(id)?;
        match tracked.engine.sample_population(1).pop() {
            Some(genes) => {
                let eval = tracked.engine.begin_evaluation(genes.clone());
                Ok((genes, eval))
            }
            None => Ok((tracked.config.midpoint_genes(), EvalId::NONE)),
        }
    }

    /// [`sample`](Self::sample), decoded into a phenotype.
    pub fn sample_decoded<P, D>(
        &self,
        id: SpeciesId,
        decoder: &D,
    ) -> Result<(P, EvalId), RegistryError>
    where
        D: Decoder<P> + ?Sized,
    {
        let (genes, eval) = self.sample(id)?;
        Ok((decoder.decode(&genes), eval))
    }

    /// Attach a fresh collector to `eval`. The sentinel id is ignored.
    pub fn begin_tracking(&self, id: SpeciesId, eval: EvalId) -> Result<(), RegistryError> {
        let tracked = self.lookup(id)?;
        if eval.is_none() {
            return Ok(());
        }
        let collector = self.collectors.acquire();
        if let Some(old) = tracked.trackers.lock().insert(eval, collector) {
            self.collectors.release(old);
        }
        Ok(())
    }

    /// Record one tick of metrics for a tracked evaluation.
    pub fn collect_metrics(
        &self,
        id: SpeciesId,
        eval: EvalId,
        sample: &MetricBundle,
        dt: f64,
    ) -> Result<(), RegistryError> {
        let tracked = self.lookup(id)?;
        if let Some(collector) = tracked.trackers.lock().get_mut(&eval) {
            collector.collect(sample, dt);
        }
        Ok(())
    }

    /// Finalize a tracked evaluation, score it and report the score to the engine.
    ///
    /// Returns the fitness, or `None` when `eval` was not being tracked.
    pub fn complete_tracking(
        &self,
        id: SpeciesId,
        eval: EvalId,
        death: &MetricBundle,
        context: Option<&dyn FitnessContext>,
    ) -> Result<Option<f64>, RegistryError> {
        let tracked = self.lookup(id)?;
        let Some(collector) = tracked.trackers.lock().remove(&eval) else {
            return Ok(None);
        };

        let metrics = collector.finalize(death);
        self.collectors.release(collector);

        let fitness = tracked.aggregator.calculate(&metrics, context);
        tracked.engine.complete_evaluation(eval, fitness);
        Ok(Some(fitness))
    }

    /// Pool statistics with normalized diversity.
    pub fn stats(&self, id: SpeciesId) -> Result<PoolStats, RegistryError> {
        let tracked = self.lookup(id)?;
        Ok(match tracked.engine.snapshot() {
            Some(pool) => pool
                .stats
                .with_diversity(normalized_diversity(&pool.members, &tracked.config.bounds)),
            None => PoolStats::default(),
        })
    }

    /// Best member of a species' current pool.
    pub fn best(&self, id: SpeciesId) -> Result<Option<Candidate<Vec<f64>, f64>>, RegistryError> {
        Ok(self.lookup(id)?.engine.best_immediate())
    }

    /// Save every initialized pool. Keeps going past failures and returns the last one.
    pub fn save_all(&self) -> Result<(), RegistryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut last_error = None;
        for tracked in self.species.read().values() {
            let Some(pool) = tracked.engine.snapshot() else {
                continue;
            };
            let dto = PopulationDto::from_pool(&pool);
            match store.save(&tracked.config.name, &dto) {
                Ok(()) => debug!(
                    "Saved '{}' ({} candidates, generation {})",
                    tracked.config.name,
                    dto.candidates.len(),
                    dto.generation
                ),
                Err(e) => {
                    warn!("Failed to save '{}': {}", tracked.config.name, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Fit a persisted population to `config`: genes clamped to bounds, wrong-length
/// genotypes replaced with random ones, and the pool cut or padded to `pool_size`
/// (best candidates kept first).
fn restore_pool(dto: PopulationDto, config: &SpeciesConfig) -> Pool<Vec<f64>, f64> {
    let pool_size = config.engine.engine.pool_size;
    let initializer = UniformInitializer::new(config.bounds.clone());
    let mut rng = match config.engine.engine.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut pool = dto.into_pool();
    for member in &mut pool.members {
        if member.data.len() == config.gene_count {
            for (gene, bounds) in member.data.iter_mut().zip(&config.bounds) {
                *gene = bounds.clamp(*gene);
            }
        } else {
            *member = Candidate::new(initializer.initialize(&mut rng));
        }
    }

    pool.sort_by_score();
    pool.members.truncate(pool_size);
    while pool.members.len() < pool_size {
        pool.members.push(Candidate::new(initializer.initialize(&mut rng)));
    }
    pool.refresh_stats();
    pool
}
