//! Genetic operators: initialization, selection, crossover and mutation.
//!
//! Operators are trait objects so engines can be assembled from interchangeable
//! strategies. The real-valued implementations here work on `Vec<f64>` genotypes
//! with per-gene bounds.

use std::sync::Arc;

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::schema::{
    Candidate, ConfigError, EngineConfig, Fitness, GeneBounds, compare_scores, validate_bounds,
};

/// Produces one random genotype.
pub trait Initializer<G>: Send + Sync {
    fn initialize(&self, rng: &mut dyn RngCore) -> G;
}

/// Picks `k` parents from a population.
pub trait Selector<G, F>: Send + Sync {
    fn select<'a>(
        &self,
        pool: &'a [Candidate<G, F>],
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Vec<&'a Candidate<G, F>>;
}

/// Recombines parent genotypes into one or more offspring.
pub trait Combiner<G>: Send + Sync {
    fn combine(&self, parents: &[&G], rng: &mut dyn RngCore) -> Vec<G>;
}

/// Mutates a genotype in place. Each gene is touched with probability `rate`.
pub trait Perturbator<G>: Send + Sync {
    fn perturb(&self, genotype: &mut G, rate: f64, rng: &mut dyn RngCore);
}

/// The full operator set an engine runs with.
pub struct Operators<G, F> {
    pub initializer: Arc<dyn Initializer<G>>,
    pub selector: Arc<dyn Selector<G, F>>,
    pub combiner: Arc<dyn Combiner<G>>,
    pub perturbator: Arc<dyn Perturbator<G>>,
}

impl<G, F> Clone for Operators<G, F> {
    fn clone(&self) -> Self {
        Self {
            initializer: Arc::clone(&self.initializer),
            selector: Arc::clone(&self.selector),
            combiner: Arc::clone(&self.combiner),
            perturbator: Arc::clone(&self.perturbator),
        }
    }
}

impl<F: Fitness> Operators<Vec<f64>, F> {
    /// Uniform init, tournament selection, uniform crossover and clamped Gaussian mutation.
    ///
    /// Fails on non-finite or inverted bounds and on a negative or NaN `std_dev`, which
    /// would otherwise panic inside an engine's background task.
    pub fn real_valued(
        bounds: &[GeneBounds],
        std_dev: f64,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        validate_bounds(bounds)?;
        if std_dev.is_nan() || std_dev < 0.0 {
            return Err(ConfigError::InvalidStdDev(std_dev));
        }

        Ok(Self {
            initializer: Arc::new(UniformInitializer::new(bounds.to_vec())),
            selector: Arc::new(TournamentSelector::new(config.tournament_size)),
            combiner: Arc::new(UniformCrossover::new(config.mix_probability)),
            perturbator: Arc::new(GaussianPerturbator::new(bounds.to_vec(), std_dev)),
        })
    }
}

/// One uniform-random value per gene, within its bounds.
#[derive(Debug, Clone)]
pub struct UniformInitializer {
    bounds: Vec<GeneBounds>,
}

impl UniformInitializer {
    pub fn new(bounds: Vec<GeneBounds>) -> Self {
        Self { bounds }
    }
}

impl Initializer<Vec<f64>> for UniformInitializer {
    fn initialize(&self, rng: &mut dyn RngCore) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| {
                if b.span() > 0.0 {
                    rng.gen_range(b.min..=b.max)
                } else {
                    b.min
                }
            })
            .collect()
    }
}

/// Best of `size` uniform draws (with replacement), repeated `k` times.
#[derive(Debug, Clone, Copy)]
pub struct TournamentSelector {
    pub size: usize,
}

impl TournamentSelector {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl<G, F: Fitness> Selector<G, F> for TournamentSelector {
    fn select<'a>(
        &self,
        pool: &'a [Candidate<G, F>],
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Vec<&'a Candidate<G, F>> {
        if pool.is_empty() {
            return Vec::new();
        }

        (0..k)
            .map(|_| {
                let mut best = &pool[rng.gen_range(0..pool.len())];
                for _ in 1..self.size {
                    let challenger = &pool[rng.gen_range(0..pool.len())];
                    if compare_scores(challenger.score, best.score).is_gt() {
                        best = challenger;
                    }
                }
                best
            })
            .collect()
    }
}

/// Per-gene coin flip between two parents.
#[derive(Debug, Clone, Copy)]
pub struct UniformCrossover {
    /// Probability of taking a gene from the first parent.
    pub mix_probability: f64,
}

impl UniformCrossover {
    pub fn new(mix_probability: f64) -> Self {
        Self {
            mix_probability: mix_probability.clamp(0.0, 1.0),
        }
    }
}

impl Default for UniformCrossover {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Combiner<Vec<f64>> for UniformCrossover {
    fn combine(&self, parents: &[&Vec<f64>], rng: &mut dyn RngCore) -> Vec<Vec<f64>> {
        match parents {
            [] => Vec::new(),
            [only] => vec![(*only).clone()],
            [a, b, ..] => {
                let child = a
                    .iter()
                    .zip(b.iter())
                    .map(|(&x, &y)| {
                        if rng.gen_bool(self.mix_probability) {
                            x
                        } else {
                            y
                        }
                    })
                    .collect();
                vec![child]
            }
        }
    }
}

/// Gaussian noise scaled by each gene's span, clamped back into bounds.
#[derive(Debug, Clone)]
pub struct GaussianPerturbator {
    bounds: Vec<GeneBounds>,
    pub std_dev: f64,
}

impl GaussianPerturbator {
    pub fn new(bounds: Vec<GeneBounds>, std_dev: f64) -> Self {
        Self { bounds, std_dev }
    }

    pub fn bounds(&self) -> &[GeneBounds] {
        &self.bounds
    }
}

impl Perturbator<Vec<f64>> for GaussianPerturbator {
    fn perturb(&self, genotype: &mut Vec<f64>, rate: f64, rng: &mut dyn RngCore) {
        for (gene, bounds) in genotype.iter_mut().zip(&self.bounds) {
            if rng.r#gen::<f64>() < rate {
                let noise: f64 = rng.sample(StandardNormal);
                *gene += noise * self.std_dev * bounds.span();
            }
            // Out-of-range inputs are clamped as well.
            *gene = bounds.clamp(*gene);
        }
    }
}

/// Mean pairwise distance, with every gene scaled by its span so the result lies in [0, 1].
pub fn normalized_diversity<F>(members: &[Candidate<Vec<f64>, F>], bounds: &[GeneBounds]) -> f64 {
    if members.len() < 2 || bounds.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            total += gene_distance(&members[i].data, &members[j].data, bounds);
            pairs += 1;
        }
    }

    (total / pairs as f64).clamp(0.0, 1.0)
}

/// Mean per-gene absolute difference, normalized by gene span.
pub fn gene_distance(a: &[f64], b: &[f64], bounds: &[GeneBounds]) -> f64 {
    let mut distance = 0.0;
    let mut count = 0;
    for ((x, y), bound) in a.iter().zip(b).zip(bounds) {
        let span = bound.span();
        if span > 0.0 {
            distance += (x - y).abs() / span;
        }
        count += 1;
    }

    if count > 0 {
        distance / count as f64
    } else {
        0.0
    }
}
