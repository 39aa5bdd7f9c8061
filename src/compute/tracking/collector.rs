//! Per-evaluation metric accumulation.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::schema::{MetricBundle, TICKS_ALIVE, TRUTHY_THRESHOLD};

/// Running sum, count and extremes of one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStat {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
}

impl Default for RunningStat {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStat {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Accumulates per-tick metrics over one actor's lifetime.
#[derive(Debug, Default)]
pub struct MetricCollector {
    ticks: u64,
    elapsed: f64,
    series: HashMap<String, RunningStat>,
    /// Seconds each metric spent above the truthiness threshold.
    active_time: HashMap<String, f64>,
}

impl MetricCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick lasting `dt` seconds.
    pub fn collect(&mut self, sample: &MetricBundle, dt: f64) {
        self.ticks += 1;
        self.elapsed += dt;

        for (key, &value) in sample {
            match self.series.get_mut(key) {
                Some(stat) => stat.push(value),
                None => {
                    let mut stat = RunningStat::default();
                    stat.push(value);
                    self.series.insert(key.clone(), stat);
                }
            }

            let active = if value > TRUTHY_THRESHOLD { dt } else { 0.0 };
            match self.active_time.get_mut(key) {
                Some(time) => *time += active,
                None => {
                    self.active_time.insert(key.clone(), active);
                }
            }
        }
    }

    /// Distinct metric keys seen so far.
    pub fn key_count(&self) -> usize {
        self.series.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Total simulated time recorded.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn stat(&self, key: &str) -> Option<&RunningStat> {
        self.series.get(key)
    }

    /// Flatten into `avg_<k>`, `min_<k>`, `max_<k>` and `time_<k>` keys plus
    /// `ticks_alive`. Keys in `death` are copied verbatim and win on conflict.
    pub fn finalize(&self, death: &MetricBundle) -> MetricBundle {
        let mut bundle = MetricBundle::with_capacity(self.series.len() * 4 + death.len() + 1);
        bundle.insert(TICKS_ALIVE.to_string(), self.ticks as f64);

        for (key, stat) in &self.series {
            bundle.insert(format!("avg_{}", key), stat.mean());
            bundle.insert(format!("min_{}", key), stat.min);
            bundle.insert(format!("max_{}", key), stat.max);
        }
        for (key, time) in &self.active_time {
            bundle.insert(format!("time_{}", key), *time);
        }
        for (key, value) in death {
            bundle.insert(key.clone(), *value);
        }

        bundle
    }

    /// Clear all state, keeping allocations for reuse.
    pub fn reset(&mut self) {
        self.ticks = 0;
        self.elapsed = 0.0;
        self.series.clear();
        self.active_time.clear();
    }
}

/// Free list of collectors, so the per-evaluation hot path does not allocate.
#[derive(Debug, Default)]
pub struct CollectorPool {
    free: Mutex<Vec<MetricCollector>>,
    max_idle: usize,
}

impl CollectorPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    pub fn acquire(&self) -> MetricCollector {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Reset `collector` and keep it for reuse, unless the pool is full.
    pub fn release(&self, mut collector: MetricCollector) {
        collector.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(collector);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
