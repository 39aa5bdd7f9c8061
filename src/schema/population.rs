//! Candidate and pool value types shared by every engine.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric fitness score. Higher is better.
pub trait Fitness: Copy + PartialOrd + Default + fmt::Debug + Send + Sync + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Fitness for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
}

impl Fitness for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

/// Handle for one in-flight evaluation.
///
/// Engines hand out ids starting at 1; [`EvalId::NONE`] means no evaluation is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvalId(pub u64);

impl EvalId {
    pub const NONE: EvalId = EvalId(0);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for EvalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eval#{}", self.0)
    }
}

/// A genotype with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<G, F> {
    pub data: G,
    pub score: F,
    /// Free-form annotations carried alongside the genotype.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl<G, F: Fitness> Candidate<G, F> {
    /// Unscored candidate.
    pub fn new(data: G) -> Self {
        Self::scored(data, F::default())
    }

    pub fn scored(data: G, score: F) -> Self {
        Self {
            data,
            score,
            metadata: HashMap::new(),
        }
    }
}

/// Compare two scores, treating incomparable values (NaN) as equal.
pub fn compare_scores<F: Fitness>(a: F, b: F) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Summary statistics of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub best: f64,
    pub worst: f64,
    pub average: f64,
    /// Genetic diversity in [0, 1], when the genotype supports it.
    #[serde(default)]
    pub diversity: Option<f64>,
}

impl PoolStats {
    pub fn from_members<G, F: Fitness>(members: &[Candidate<G, F>]) -> Self {
        if members.is_empty() {
            return Self::default();
        }

        let mut best = f64::NEG_INFINITY;
        let mut worst = f64::INFINITY;
        let mut sum = 0.0;
        for c in members {
            let s = c.score.to_f64();
            best = best.max(s);
            worst = worst.min(s);
            sum += s;
        }

        Self {
            best,
            worst,
            average: sum / members.len() as f64,
            diversity: None,
        }
    }

    pub fn with_diversity(mut self, diversity: f64) -> Self {
        self.diversity = Some(diversity);
        self
    }
}

/// Fixed-size population.
///
/// Engines overwrite members in place and never change the length.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool<G, F> {
    pub members: Vec<Candidate<G, F>>,
    pub generation: u64,
    pub stats: PoolStats,
}

impl<G, F: Fitness> Pool<G, F> {
    pub fn new(members: Vec<Candidate<G, F>>, generation: u64) -> Self {
        let stats = PoolStats::from_members(&members);
        Self {
            members,
            generation,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Recompute `stats` from the current members.
    pub fn refresh_stats(&mut self) {
        let diversity = self.stats.diversity;
        self.stats = PoolStats::from_members(&self.members);
        self.stats.diversity = diversity;
    }

    /// Index of the lowest-scoring member (first one on ties).
    pub fn worst_index(&self) -> Option<usize> {
        self.members
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| compare_scores(a.score, b.score))
            .map(|(i, _)| i)
    }

    /// Highest-scoring member, found by linear scan.
    pub fn best(&self) -> Option<&Candidate<G, F>> {
        self.members
            .iter()
            .max_by(|a, b| compare_scores(a.score, b.score))
    }

    /// Order members by descending score so the elites occupy the leading slots.
    pub fn sort_by_score(&mut self) {
        self.members.sort_by(|a, b| compare_scores(b.score, a.score));
    }
}
