//! Metric bundles and fitness aggregation settings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metric name to a single sample (per tick) or a finalized value (per evaluation).
pub type MetricBundle = HashMap<String, f64>;

/// Number of ticks an actor was alive.
pub const TICKS_ALIVE: &str = "ticks_alive";
/// Set to 1.0 when the actor died at its target.
pub const DEATH_AT_TARGET: &str = "death_at_target";
/// Size of the group the actor belonged to.
pub const MEMBER_COUNT: &str = "member_count";

/// Values above this count as "true" for time-in-state accounting.
pub const TRUTHY_THRESHOLD: f64 = 0.5;

/// Maps a raw metric value onto a comparable scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Normalizer {
    /// `(raw - min) / (max - min)`, clamped to [0, 1].
    Linear { min: f64, max: f64 },
    /// `1 / (1 + raw / scale)`; smaller raw values score higher.
    Inverse { scale: f64 },
    /// `min(raw / max, 1)`.
    Cap { max: f64 },
}

impl Normalizer {
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            Normalizer::Linear { min, max } => {
                let span = max - min;
                if span.abs() < f64::EPSILON {
                    0.0
                } else {
                    ((raw - min) / span).clamp(0.0, 1.0)
                }
            }
            Normalizer::Inverse { scale } => {
                if scale.abs() < f64::EPSILON {
                    0.0
                } else {
                    1.0 / (1.0 + raw / scale)
                }
            }
            Normalizer::Cap { max } => {
                if max.abs() < f64::EPSILON {
                    0.0
                } else {
                    (raw / max).min(1.0)
                }
            }
        }
    }
}

/// Scales one metric's weight by a world-state signal: `weight *= 1 + gain * signal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWeight {
    /// Context key to read, e.g. `"difficulty"`.
    pub signal: String,
    /// Metric whose weight is adjusted.
    pub metric: String,
    pub gain: f64,
}

/// Declarative weighted-sum fitness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub normalizers: HashMap<String, Normalizer>,
    #[serde(default)]
    pub context_weights: Vec<ContextWeight>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        let n = Normalizer::Linear { min: 10.0, max: 20.0 };
        assert_eq!(n.apply(15.0), 0.5);
        assert_eq!(n.apply(5.0), 0.0);
        assert_eq!(n.apply(25.0), 1.0);
        assert_eq!(Normalizer::Linear { min: 1.0, max: 1.0 }.apply(3.0), 0.0);
    }

    #[test]
    fn test_inverse() {
        let n = Normalizer::Inverse { scale: 2.0 };
        assert_eq!(n.apply(0.0), 1.0);
        assert_eq!(n.apply(2.0), 0.5);
    }

    #[test]
    fn test_cap() {
        let n = Normalizer::Cap { max: 4.0 };
        assert_eq!(n.apply(2.0), 0.5);
        assert_eq!(n.apply(10.0), 1.0);
    }

    #[test]
    fn test_normalizer_serialization() {
        let json = r#"{"type": "inverse", "scale": 3.0}"#;
        let parsed: Normalizer = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, Normalizer::Inverse { scale: 3.0 });
    }
}
