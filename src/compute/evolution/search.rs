//! Synchronous generational search.
//!
//! Evaluates the whole pool, then breeds the next generation from it. This is the
//! offline baseline; it needs an evaluator that can score a genotype on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use rand::prelude::*;
use rayon::prelude::*;

use crate::schema::{Candidate, EngineConfig, Fitness, Pool, PoolStats};

use super::genome::Operators;

/// Early-termination predicate, given the current pool and iteration.
pub type TerminationFn<G, F> = Box<dyn Fn(&Pool<G, F>, usize) -> bool + Send + Sync>;

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxIterations,
    Terminated,
    Cancelled,
}

/// Search errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Final state of a search.
#[derive(Debug, Clone)]
pub struct SearchResult<G, F> {
    /// The last completed pool.
    pub pool: Pool<G, F>,
    /// Stats of every generation, starting with the initial pool.
    pub history: Vec<PoolStats>,
    pub iterations: usize,
    pub stop_reason: StopReason,
}

impl<G, F> SearchResult<G, F> {
    /// `Err` if the search was cancelled. The pool is still available on `self`.
    pub fn check(&self) -> Result<(), SearchError> {
        match self.stop_reason {
            StopReason::Cancelled => Err(SearchError::Cancelled {
                iterations: self.iterations,
            }),
            _ => Ok(()),
        }
    }
}

/// Generational evolution engine.
pub struct SyncEngine<G, F> {
    config: EngineConfig,
    operators: Operators<G, F>,
    rng: StdRng,
    cancelled: Arc<AtomicBool>,
}

impl<G, F> SyncEngine<G, F>
where
    G: Clone + Send + Sync,
    F: Fitness,
{
    pub fn new(config: EngineConfig, operators: Operators<G, F>) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            operators,
            rng,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Run up to `max_iterations` generations.
    pub fn run<E>(
        &mut self,
        evaluator: E,
        termination: Option<TerminationFn<G, F>>,
    ) -> Result<SearchResult<G, F>, SearchError>
    where
        E: Fn(&G) -> F + Send + Sync,
    {
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers.max(1))
            .build()
            .map_err(|e| SearchError::WorkerPool(e.to_string()))?;

        let mut pool = workers.install(|| self.initialize(&evaluator));
        let mut history = vec![pool.stats];
        info!(
            "Initialized pool of {} (best {:.4})",
            pool.len(),
            pool.stats.best
        );

        let mut iterations = 0;
        let stop_reason = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if let Some(done) = &termination
                && done(&pool, iterations)
            {
                break StopReason::Terminated;
            }
            if iterations >= self.config.max_iterations {
                break StopReason::MaxIterations;
            }

            pool = workers.install(|| self.step(&pool, &evaluator));
            iterations += 1;
            history.push(pool.stats);
            debug!(
                "Generation {}: best {:.4}, avg {:.4}",
                pool.generation, pool.stats.best, pool.stats.average
            );
        };

        Ok(SearchResult {
            pool,
            history,
            iterations,
            stop_reason,
        })
    }

    /// Random, evaluated initial pool.
    fn initialize<E>(&mut self, evaluator: &E) -> Pool<G, F>
    where
        E: Fn(&G) -> F + Send + Sync,
    {
        let initializer = &self.operators.initializer;
        let seeds: Vec<u64> = (0..self.config.pool_size)
            .map(|_| self.rng.r#gen())
            .collect();

        let members: Vec<Candidate<G, F>> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let data = initializer.initialize(&mut rng);
                let score = evaluator(&data);
                Candidate::scored(data, score)
            })
            .collect();

        Pool::new(members, 0)
    }

    /// Breed and evaluate the next generation.
    fn step<E>(&mut self, pool: &Pool<G, F>, evaluator: &E) -> Pool<G, F>
    where
        E: Fn(&G) -> F + Send + Sync,
    {
        let size = self.config.pool_size;
        let mut ranked = pool.clone();
        ranked.sort_by_score();

        // Elitism: keep best individuals
        let elite = self.config.elite_count.min(ranked.len());
        let mut next: Vec<Candidate<G, F>> = ranked.members[..elite].to_vec();

        let mut offspring: Vec<G> = Vec::with_capacity(size - next.len());
        while next.len() + offspring.len() < size {
            let parents = self
                .operators
                .selector
                .select(&ranked.members, 2, &mut self.rng);
            if parents.is_empty() {
                break;
            }
            let genotypes: Vec<&G> = parents.iter().map(|c| &c.data).collect();
            for mut child in self.operators.combiner.combine(&genotypes, &mut self.rng) {
                if next.len() + offspring.len() >= size {
                    break;
                }
                self.operators
                    .perturbator
                    .perturb(&mut child, self.config.mutation_rate, &mut self.rng);
                offspring.push(child);
            }
        }

        let scored: Vec<Candidate<G, F>> = offspring
            .into_par_iter()
            .map(|data| {
                let score = evaluator(&data);
                Candidate::scored(data, score)
            })
            .collect();
        next.extend(scored);

        Pool::new(next, pool.generation + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::GeneBounds;

    fn config(pool_size: usize, max_iterations: usize) -> EngineConfig {
        EngineConfig {
            pool_size,
            max_iterations,
            max_workers: 2,
            random_seed: Some(42),
            ..Default::default()
        }
    }

    fn engine(pool_size: usize, max_iterations: usize) -> SyncEngine<Vec<f64>, f64> {
        let config = config(pool_size, max_iterations);
        let bounds = vec![GeneBounds::new(0.0, 1.0); 4];
        let operators = Operators::real_valued(&bounds, 0.1, &config).unwrap();
        SyncEngine::new(config, operators)
    }

    /// Higher when genes are close to 0.75.
    fn target(genes: &Vec<f64>) -> f64 {
        let err: f64 = genes.iter().map(|g| (g - 0.75).powi(2)).sum();
        1.0 / (1.0 + err)
    }

    #[test]
    fn test_run_to_max_iterations() {
        let mut engine = engine(16, 10);
        let result = engine.run(target, None).unwrap();

        assert_eq!(result.stop_reason, StopReason::MaxIterations);
        assert_eq!(result.iterations, 10);
        assert_eq!(result.pool.generation, 10);
        assert_eq!(result.pool.len(), 16);
        assert_eq!(result.history.len(), 11);
        assert!(result.check().is_ok());
    }

    #[test]
    fn test_elitism_keeps_best_non_decreasing() {
        let mut engine = engine(20, 15);
        let result = engine.run(target, None).unwrap();

        for pair in result.history.windows(2) {
            assert!(pair[1].best >= pair[0].best);
        }
    }

    #[test]
    fn test_genes_stay_in_bounds() {
        let mut engine = engine(12, 8);
        let result = engine.run(target, None).unwrap();
        for c in &result.pool.members {
            assert!(c.data.iter().all(|g| (0.0..=1.0).contains(g)));
        }
    }

    #[test]
    fn test_termination_fn() {
        let mut engine = engine(8, 100);
        let result = engine
            .run(
                target,
                Some(Box::new(|_: &Pool<Vec<f64>, f64>, iteration: usize| {
                    iteration >= 3
                })),
            )
            .unwrap();
        assert_eq!(result.stop_reason, StopReason::Terminated);
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn test_cancellation() {
        let mut engine = engine(8, 100);
        let cancel = engine.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run(target, None).unwrap();
        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert_eq!(result.pool.len(), 8);
        assert_eq!(
            result.check(),
            Err(SearchError::Cancelled { iterations: 0 })
        );
    }
}
