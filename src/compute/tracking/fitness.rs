//! Scalar fitness from finalized metric bundles.

use std::collections::HashMap;

use crate::schema::{AggregatorConfig, ContextWeight, MetricBundle, Normalizer};

/// Named world-state signals, e.g. a current difficulty estimate.
pub trait FitnessContext {
    fn get(&self, key: &str) -> Option<f64>;
}

impl FitnessContext for HashMap<String, f64> {
    fn get(&self, key: &str) -> Option<f64> {
        HashMap::get(self, key).copied()
    }
}

/// Turns a finalized metric bundle into one fitness value.
pub trait FitnessAggregator: Send + Sync {
    fn calculate(&self, metrics: &MetricBundle, context: Option<&dyn FitnessContext>) -> f64;
}

/// Closure adjusting the weight table from context before scoring.
pub type WeightAdjuster = Box<dyn Fn(&mut HashMap<String, f64>, &dyn FitnessContext) + Send + Sync>;

/// `Σ weight[k] × normalize[k](metric[k])` over weighted metrics.
///
/// Metrics absent from the bundle contribute nothing. Metrics without a normalizer
/// are used raw.
#[derive(Default)]
pub struct WeightedAggregator {
    weights: HashMap<String, f64>,
    normalizers: HashMap<String, Normalizer>,
    context_weights: Vec<ContextWeight>,
    adjusters: Vec<WeightAdjuster>,
}

impl WeightedAggregator {
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self {
            weights,
            ..Default::default()
        }
    }

    pub fn from_config(config: AggregatorConfig) -> Self {
        Self {
            weights: config.weights,
            normalizers: config.normalizers,
            context_weights: config.context_weights,
            adjusters: Vec::new(),
        }
    }

    pub fn with_normalizer(mut self, metric: impl Into<String>, normalizer: Normalizer) -> Self {
        self.normalizers.insert(metric.into(), normalizer);
        self
    }

    pub fn with_context_weight(mut self, rule: ContextWeight) -> Self {
        self.context_weights.push(rule);
        self
    }

    /// Register a closure run after the declarative context rules.
    pub fn with_adjuster<A>(mut self, adjuster: A) -> Self
    where
        A: Fn(&mut HashMap<String, f64>, &dyn FitnessContext) + Send + Sync + 'static,
    {
        self.adjusters.push(Box::new(adjuster));
        self
    }

    pub fn weights(&self) -> &HashMap<String, f64> {
        &self.weights
    }

    fn effective_weights(&self, context: &dyn FitnessContext) -> HashMap<String, f64> {
        let mut weights = self.weights.clone();
        for rule in &self.context_weights {
            if let Some(signal) = context.get(&rule.signal)
                && let Some(weight) = weights.get_mut(&rule.metric)
            {
                *weight *= 1.0 + rule.gain * signal;
            }
        }
        for adjust in &self.adjusters {
            adjust(&mut weights, context);
        }
        weights
    }

    fn weighted_sum(&self, metrics: &MetricBundle, weights: &HashMap<String, f64>) -> f64 {
        weights
            .iter()
            .filter_map(|(key, weight)| {
                let raw = *metrics.get(key)?;
                let value = match self.normalizers.get(key) {
                    Some(n) => n.apply(raw),
                    None => raw,
                };
                Some(weight * value)
            })
            .sum()
    }
}

impl FitnessAggregator for WeightedAggregator {
    fn calculate(&self, metrics: &MetricBundle, context: Option<&dyn FitnessContext>) -> f64 {
        match context {
            Some(ctx) if !self.context_weights.is_empty() || !self.adjusters.is_empty() => {
                let weights = self.effective_weights(ctx);
                self.weighted_sum(metrics, &weights)
            }
            _ => self.weighted_sum(metrics, &self.weights),
        }
    }
}

impl std::fmt::Debug for WeightedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedAggregator")
            .field("weights", &self.weights)
            .field("normalizers", &self.normalizers)
            .field("context_weights", &self.context_weights)
            .field("adjusters", &self.adjusters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(pairs: &[(&str, f64)]) -> MetricBundle {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_plain_weighted_sum() {
        let agg = WeightedAggregator::new(bundle(&[("a", 0.5), ("b", 0.5)]));
        let fitness = agg.calculate(&bundle(&[("a", 0.8), ("b", 0.6)]), None);
        assert_eq!(fitness, 0.7);
    }

    #[test]
    fn test_missing_metric_skipped() {
        let agg = WeightedAggregator::new(bundle(&[("a", 1.0), ("b", 2.0)]));
        assert_eq!(agg.calculate(&bundle(&[("a", 0.25), ("c", 9.0)]), None), 0.25);
    }

    #[test]
    fn test_normalizers_applied() {
        let agg = WeightedAggregator::new(bundle(&[("ticks_alive", 1.0), ("distance", 2.0)]))
            .with_normalizer("ticks_alive", Normalizer::Cap { max: 100.0 })
            .with_normalizer("distance", Normalizer::Inverse { scale: 10.0 });
        let fitness = agg.calculate(&bundle(&[("ticks_alive", 50.0), ("distance", 10.0)]), None);
        assert!((fitness - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_context_weight_rule() {
        let agg = WeightedAggregator::new(bundle(&[("survival", 1.0)])).with_context_weight(
            ContextWeight {
                signal: "difficulty".to_string(),
                metric: "survival".to_string(),
                gain: 2.0,
            },
        );
        let metrics = bundle(&[("survival", 0.5)]);

        let hard = bundle(&[("difficulty", 0.5)]);
        assert_eq!(agg.calculate(&metrics, Some(&hard)), 1.0);

        // Signal absent: weight unchanged.
        let calm: HashMap<String, f64> = HashMap::new();
        assert_eq!(agg.calculate(&metrics, Some(&calm)), 0.5);
        assert_eq!(agg.calculate(&metrics, None), 0.5);
    }

    #[test]
    fn test_closure_adjuster() {
        let agg = WeightedAggregator::new(bundle(&[("a", 1.0)])).with_adjuster(|weights, ctx| {
            if ctx.get("boost").is_some() {
                weights.insert("a".to_string(), 3.0);
            }
        });
        let metrics = bundle(&[("a", 1.0)]);
        assert_eq!(agg.calculate(&metrics, Some(&bundle(&[("boost", 1.0)]))), 3.0);
        assert_eq!(agg.calculate(&metrics, None), 1.0);
        // Base weights are not mutated by scoring.
        assert_eq!(agg.weights()["a"], 1.0);
    }

    #[test]
    fn test_from_config_json() {
        let json = r#"{
            "weights": {"avg_speed": 0.5, "death_at_target": 1.0},
            "normalizers": {"avg_speed": {"type": "linear", "min": 0.0, "max": 10.0}}
        }"#;
        let config: AggregatorConfig = serde_json::from_str(json).unwrap();
        let agg = WeightedAggregator::from_config(config);
        let fitness = agg.calculate(&bundle(&[("avg_speed", 5.0), ("death_at_target", 1.0)]), None);
        assert!((fitness - 1.25).abs() < 1e-12);
    }
}
