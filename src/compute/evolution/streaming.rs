//! Non-blocking steady-state evolution.
//!
//! Callers sample genotypes, hand them to live actors and report fitness whenever the
//! actor's life ends. A single background task per engine absorbs those reports and
//! advances the pool in small, wall-clock bounded steps:
//!
//! - Each outcome replaces the current worst member if it scores strictly higher.
//! - Every `min_outcomes_per_gen` outcomes, a budgeted step breeds up to a quarter of
//!   the pool into random non-elite slots until `tick_budget` runs out, then bumps
//!   the generation counter.
//!
//! Reporting never blocks: outcomes go through a bounded channel with `try_send` and are
//! dropped when it is full. Outcomes for unknown ids are ignored. Readers always see a
//! complete pool because the task publishes a fresh `Arc` snapshot after every change.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use parking_lot::{Mutex, RwLock};
use rand::prelude::*;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::schema::{
    Candidate, EngineConfig, EvalId, Fitness, Pool, PoolStats, StreamingConfig, compare_scores,
};

use super::genome::Operators;

/// How long `request_best` waits on the background task before answering itself.
const BEST_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Streaming engine errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine must be started from within a tokio runtime")]
    NoRuntime,
    #[error("Pool cannot be replaced while the background task is running")]
    Running,
}

/// A fitness report for one evaluation.
#[derive(Debug, Clone, Copy)]
struct Outcome<F> {
    id: EvalId,
    score: F,
}

type BestReply<G, F> = oneshot::Sender<Option<Candidate<G, F>>>;

/// Receiving ends, owned by whichever background task is running.
struct Inbox<G, F> {
    outcomes: mpsc::Receiver<Outcome<F>>,
    best_requests: mpsc::Receiver<BestReply<G, F>>,
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub outcomes_received: AtomicU64,
    pub outcomes_dropped: AtomicU64,
    pub outcomes_stale: AtomicU64,
    pub replacements: AtomicU64,
    pub evolution_steps: AtomicU64,
    pub offspring_produced: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineMetricsSnapshot {
    pub outcomes_received: u64,
    pub outcomes_dropped: u64,
    pub outcomes_stale: u64,
    pub replacements: u64,
    pub evolution_steps: u64,
    pub offspring_produced: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            outcomes_received: self.outcomes_received.load(Ordering::Relaxed),
            outcomes_dropped: self.outcomes_dropped.load(Ordering::Relaxed),
            outcomes_stale: self.outcomes_stale.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            evolution_steps: self.evolution_steps.load(Ordering::Relaxed),
            offspring_produced: self.offspring_produced.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the public handle and the background task.
struct Shared<G, F> {
    config: StreamingConfig,
    operators: Operators<G, F>,
    pool: RwLock<Option<Arc<Pool<G, F>>>>,
    pending: RwLock<HashMap<EvalId, Candidate<G, F>>>,
    next_id: AtomicU64,
    metrics: EngineMetrics,
    inbox: tokio::sync::Mutex<Inbox<G, F>>,
}

struct RunHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Streaming evolution engine.
pub struct StreamingEngine<G, F> {
    shared: Arc<Shared<G, F>>,
    outcome_tx: mpsc::Sender<Outcome<F>>,
    best_tx: mpsc::Sender<BestReply<G, F>>,
    run: Mutex<Option<RunHandle>>,
}

impl<G, F> StreamingEngine<G, F>
where
    G: Clone + Send + Sync + 'static,
    F: Fitness,
{
    pub fn new(config: StreamingConfig, operators: Operators<G, F>) -> Self {
        let (outcome_tx, outcomes) = mpsc::channel(config.outcome_capacity.max(1));
        let (best_tx, best_requests) = mpsc::channel(16);

        let shared = Arc::new(Shared {
            config,
            operators,
            pool: RwLock::new(None),
            pending: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics: EngineMetrics::default(),
            inbox: tokio::sync::Mutex::new(Inbox {
                outcomes,
                best_requests,
            }),
        });

        Self {
            shared,
            outcome_tx,
            best_tx,
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.shared.config
    }

    /// Start the background task. No-op if already running.
    ///
    /// The pool is created on first start only, so it survives stop/start cycles.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        self.initialize_pool();

        let seed = self
            .shared
            .config
            .engine
            .random_seed
            .unwrap_or_else(rand::random);
        let (stop, stop_rx) = oneshot::channel();
        let task = runtime.spawn(event_loop(Arc::clone(&self.shared), stop_rx, seed));
        *run = Some(RunHandle { stop, task });

        info!(
            "Streaming engine started (pool {}, generation {})",
            self.shared.config.engine.pool_size,
            self.generation()
        );
        Ok(())
    }

    /// Signal the background task to exit. Does not wait for it.
    pub fn stop(&self) {
        if let Some(run) = self.run.lock().take() {
            let _ = run.stop.send(());
            info!("Streaming engine stopping");
        }
    }

    /// Stop and wait until the background task has exited.
    pub async fn shutdown(&self) {
        let handle = self.run.lock().take();
        if let Some(run) = handle {
            let _ = run.stop.send(());
            let _ = run.task.await;
        }
    }

    /// Whether the background task is alive. False once it has exited, even without `stop`.
    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Create the initial random pool unless one already exists.
    pub fn initialize_pool(&self) {
        let mut slot = self.shared.pool.write();
        if slot.is_some() {
            return;
        }

        let mut rng = match self.shared.config.engine.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let members = (0..self.shared.config.engine.pool_size)
            .map(|_| Candidate::new(self.shared.operators.initializer.initialize(&mut rng)))
            .collect();
        *slot = Some(Arc::new(Pool::new(members, 0)));
    }

    /// Replace the pool wholesale, e.g. with a persisted population.
    ///
    /// Only allowed while stopped: the background task is the sole writer once started.
    /// Also fails after `stop` until the old task has drained out.
    pub fn set_pool(&self, mut pool: Pool<G, F>) -> Result<(), EngineError> {
        // Holding `run` keeps `start` out until the pool is published.
        let run = self.run.lock();
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Err(EngineError::Running);
        }
        let Ok(_inbox) = self.shared.inbox.try_lock() else {
            return Err(EngineError::Running);
        };

        pool.refresh_stats();
        self.shared.publish(pool);
        Ok(())
    }

    /// Current pool snapshot, if initialized.
    pub fn snapshot(&self) -> Option<Arc<Pool<G, F>>> {
        self.shared.snapshot()
    }

    /// Register a genotype as being evaluated and return its handle.
    pub fn begin_evaluation(&self, genotype: G) -> EvalId {
        let id = EvalId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .pending
            .write()
            .insert(id, Candidate::new(genotype));
        id
    }

    /// Report a fitness. Dropped silently if the outcome channel is full.
    pub fn complete_evaluation(&self, id: EvalId, score: F) {
        let metrics = &self.shared.metrics;
        match self.outcome_tx.try_send(Outcome { id, score }) {
            Ok(()) => {
                metrics.outcomes_received.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                metrics.outcomes_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Outcome channel full, dropped {}", id);
            }
        }
    }

    /// `n` genotypes drawn uniformly with replacement. Empty if there is no pool yet.
    pub fn sample_population(&self, n: usize) -> Vec<G> {
        let Some(pool) = self.snapshot() else {
            return Vec::new();
        };
        let mut rng = rand::thread_rng();
        (0..n)
            .filter_map(|_| pool.members.choose(&mut rng))
            .map(|c| c.data.clone())
            .collect()
    }

    /// Best member of the current snapshot.
    pub fn best_immediate(&self) -> Option<Candidate<G, F>> {
        self.shared.best_immediate()
    }

    /// Ask the background task for the best member, so the answer reflects every
    /// outcome it has consumed so far. Answers locally if the task is not running.
    pub async fn request_best(&self) -> Option<Candidate<G, F>> {
        if !self.is_running() {
            return self.best_immediate();
        }

        let (reply, answer) = oneshot::channel();
        if self.best_tx.try_send(reply).is_err() {
            return self.best_immediate();
        }
        match tokio::time::timeout(BEST_REQUEST_TIMEOUT, answer).await {
            Ok(Ok(best)) => best,
            _ => self.best_immediate(),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.snapshot().map(|p| p.stats).unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().map(|p| p.generation).unwrap_or(0)
    }

    /// Evaluations begun but not yet consumed.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.read().len()
    }

    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl<G, F> Drop for StreamingEngine<G, F> {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            let _ = run.stop.send(());
        }
    }
}

impl<G, F> Shared<G, F>
where
    G: Clone + Send + Sync + 'static,
    F: Fitness,
{
    fn snapshot(&self) -> Option<Arc<Pool<G, F>>> {
        self.pool.read().clone()
    }

    fn publish(&self, pool: Pool<G, F>) {
        *self.pool.write() = Some(Arc::new(pool));
    }

    fn best_immediate(&self) -> Option<Candidate<G, F>> {
        self.snapshot().and_then(|p| p.best().cloned())
    }

    /// Consume one outcome. Returns false for unknown ids.
    fn absorb(&self, outcome: Outcome<F>) -> bool {
        let Some(mut candidate) = self.pending.write().remove(&outcome.id) else {
            self.metrics.outcomes_stale.fetch_add(1, Ordering::Relaxed);
            trace!("Ignoring outcome for unknown {}", outcome.id);
            return false;
        };
        candidate.score = outcome.score;

        let Some(current) = self.snapshot() else {
            return true;
        };
        let Some(worst) = current.worst_index() else {
            return true;
        };
        if compare_scores(candidate.score, current.members[worst].score).is_gt() {
            let mut next = Pool::clone(&current);
            next.members[worst] = candidate;
            next.refresh_stats();
            self.publish(next);
            self.metrics.replacements.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// One budgeted evolution step.
    fn evolve(&self, rng: &mut StdRng) {
        let Some(current) = self.snapshot() else {
            return;
        };

        let started = Instant::now();
        let deadline = started + self.config.tick_budget();
        let mut next = Pool::clone(&current);
        let produced = breed_into(&mut next, &self.operators, &self.config.engine, deadline, rng);
        next.generation += 1;
        next.refresh_stats();

        debug!(
            "Generation {}: {} offspring in {:?}, best {:.4}, avg {:.4}",
            next.generation,
            produced,
            started.elapsed(),
            next.stats.best,
            next.stats.average
        );
        self.publish(next);

        self.metrics.evolution_steps.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .offspring_produced
            .fetch_add(produced as u64, Ordering::Relaxed);
    }
}

/// Background task: consume outcomes and best-candidate requests until stopped.
async fn event_loop<G, F>(shared: Arc<Shared<G, F>>, mut stop: oneshot::Receiver<()>, seed: u64)
where
    G: Clone + Send + Sync + 'static,
    F: Fitness,
{
    // Serializes with a previous task that has not yet observed its stop signal.
    let mut inbox = shared.inbox.lock().await;
    let Inbox {
        outcomes,
        best_requests,
    } = &mut *inbox;

    let mut rng = StdRng::seed_from_u64(seed);
    let threshold = shared.config.min_outcomes_per_gen.max(1);
    let mut completed = 0usize;

    loop {
        tokio::select! {
            _ = &mut stop => break,

            Some(outcome) = outcomes.recv() => {
                if shared.absorb(outcome) {
                    completed += 1;
                }
                if completed >= threshold {
                    shared.evolve(&mut rng);
                    completed = 0;
                }
            }

            Some(reply) = best_requests.recv() => {
                let _ = reply.send(shared.best_immediate());
            }
        }
    }

    while let Ok(reply) = best_requests.try_recv() {
        let _ = reply.send(shared.best_immediate());
    }
    debug!("Streaming engine task exited");
}

/// Overwrite random non-elite slots with fresh, unscored offspring until either a
/// quarter of the pool has been produced or `deadline` passes. Returns the count.
///
/// The pool is sorted by score first so the elites sit in `[0, elite_count)`.
fn breed_into<G, F>(
    pool: &mut Pool<G, F>,
    operators: &Operators<G, F>,
    config: &EngineConfig,
    deadline: Instant,
    rng: &mut StdRng,
) -> usize
where
    G: Clone,
    F: Fitness,
{
    let size = pool.len();
    let elite = config.elite_count.min(size);
    if elite >= size {
        return 0;
    }

    pool.sort_by_score();
    let quota = (size / 4).max(1);
    let mut produced = 0;

    while produced < quota && Instant::now() < deadline {
        let parents: Vec<G> = operators
            .selector
            .select(&pool.members, 2, rng)
            .into_iter()
            .map(|c| c.data.clone())
            .collect();
        if parents.is_empty() {
            break;
        }
        let parent_refs: Vec<&G> = parents.iter().collect();

        for mut child in operators.combiner.combine(&parent_refs, rng) {
            if produced >= quota {
                break;
            }
            operators
                .perturbator
                .perturb(&mut child, config.mutation_rate, rng);
            let slot = rng.gen_range(elite..size);
            pool.members[slot] = Candidate::new(child);
            produced += 1;
        }
    }

    produced
}
