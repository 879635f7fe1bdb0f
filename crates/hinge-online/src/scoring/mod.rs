//! Activation scoring: one scalar priority per random variable of a
//! snapshot.
//!
//! | strategy | score of an atom |
//! |---|---|
//! | `truthvalue` | `1 − |0.5 − v|` |
//! | `random` | uniform draw in `[0, 1)` |
//! | `simple` | `λ·Σ|y| + ω·max weight` |
//! | `lagrange{agg}` | `agg(|y|)`, constraint participations scaled by `C` |
//! | `wtlagrange{agg}`, `ruleweighted{agg}` | `agg(w·|y|)`, constraints scaled by `C` |
//! | `unsatisfied{agg}` | `agg` of each touching kernel's incompatibility or infeasibility |
//! | `wtunsatisfied{agg}` | same, scaled by `w` or `C` |
//! | `printfeatures` | `0`; features go to the `hinge::features` target |

pub mod features;

use crate::config::ScoringConfig;
use crate::snapshot::{ReasonerSnapshot, VariableState};
use hinge_model::{Atom, GroundKernel};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use features::{ActivationFeatures, FEATURES_TARGET};

/// Scores keyed in atom order.
pub type ScoreMap = BTreeMap<Atom, f64>;

/// Added before inverting so scores near zero stay finite.
pub const INVERSION_SMOOTHING: f64 = 0.01;

/// Tracing target the final score map is written to.
pub const SCORES_TARGET: &str = "hinge::scores";

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Max,
    Avg,
    Tot,
}

impl Aggregation {
    /// Aggregate `values`; an empty input aggregates to 0.
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Tot => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Aggregation::Max => "max",
            Aggregation::Avg => "avg",
            Aggregation::Tot => "tot",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "max" => Some(Aggregation::Max),
            "avg" => Some(Aggregation::Avg),
            "tot" => Some(Aggregation::Tot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoringStrategy {
    TruthValue,
    Random,
    Simple,
    Lagrange(Aggregation),
    WeightedLagrange(Aggregation),
    Unsatisfied(Aggregation),
    WeightedUnsatisfied(Aggregation),
    /// Diagnostic only: scores every atom 0.
    PrintFeatures,
}

/// Why the configured strategy name was not used as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFallback {
    /// Unrecognised name; `simple` used instead.
    UnknownMethod(String),
    /// A family name without aggregator and none configured; `max` used.
    MissingAggregation(String),
}

impl fmt::Display for ScoringFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringFallback::UnknownMethod(name) => {
                write!(f, "unknown scoring method `{name}`, using simple")
            }
            ScoringFallback::MissingAggregation(name) => {
                write!(f, "no aggregation for scoring method `{name}`, using max")
            }
        }
    }
}

impl ScoringStrategy {
    /// Parse a strategy name (case-insensitive). Bare family names take
    /// `aggregation`.
    pub fn from_name(name: &str, aggregation: Option<Aggregation>) -> (Self, Option<ScoringFallback>) {
        let lower = name.trim().to_ascii_lowercase();
        let exact = match lower.as_str() {
            "truthvalue" => Some(ScoringStrategy::TruthValue),
            "random" => Some(ScoringStrategy::Random),
            "simple" => Some(ScoringStrategy::Simple),
            "printfeatures" => Some(ScoringStrategy::PrintFeatures),
            "ruleweighted" => Some(ScoringStrategy::WeightedLagrange(Aggregation::Tot)),
            "ruleweightedscaled" => Some(ScoringStrategy::WeightedLagrange(Aggregation::Avg)),
            _ => None,
        };
        if let Some(strategy) = exact {
            return (strategy, None);
        }

        type Family = fn(Aggregation) -> ScoringStrategy;
        let families: [(&str, Family); 5] = [
            ("wtlagrange", ScoringStrategy::WeightedLagrange),
            ("ruleweighted", ScoringStrategy::WeightedLagrange),
            ("lagrange", ScoringStrategy::Lagrange),
            ("wtunsatisfied", ScoringStrategy::WeightedUnsatisfied),
            ("unsatisfied", ScoringStrategy::Unsatisfied),
        ];
        for (prefix, family) in families {
            let Some(rest) = lower.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                return match aggregation {
                    Some(agg) => (family(agg), None),
                    None => (
                        family(Aggregation::Max),
                        Some(ScoringFallback::MissingAggregation(name.to_string())),
                    ),
                };
            }
            if let Some(agg) = Aggregation::from_suffix(rest) {
                return (family(agg), None);
            }
        }

        (
            ScoringStrategy::Simple,
            Some(ScoringFallback::UnknownMethod(name.to_string())),
        )
    }
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringStrategy::TruthValue => f.write_str("truthvalue"),
            ScoringStrategy::Random => f.write_str("random"),
            ScoringStrategy::Simple => f.write_str("simple"),
            ScoringStrategy::PrintFeatures => f.write_str("printfeatures"),
            ScoringStrategy::Lagrange(a) => write!(f, "lagrange{}", a.suffix()),
            ScoringStrategy::WeightedLagrange(a) => write!(f, "wtlagrange{}", a.suffix()),
            ScoringStrategy::Unsatisfied(a) => write!(f, "unsatisfied{}", a.suffix()),
            ScoringStrategy::WeightedUnsatisfied(a) => write!(f, "wtunsatisfied{}", a.suffix()),
        }
    }
}

// ============================================================================
// Scorer
// ============================================================================

#[derive(Debug, Clone)]
pub struct ActivationScorer {
    strategy: ScoringStrategy,
    invert: bool,
    print_scores: bool,
    constraint_weight: f64,
    lagrange_coefficient: f64,
    weight_coefficient: f64,
}

impl ActivationScorer {
    pub fn new(strategy: ScoringStrategy, config: &ScoringConfig) -> Self {
        Self {
            strategy,
            invert: config.invert,
            print_scores: config.print_scores,
            constraint_weight: config.constraint_weight,
            lagrange_coefficient: config.lagrange_coefficient,
            weight_coefficient: config.weight_coefficient,
        }
    }

    /// Build from configuration, warning when the method name falls back.
    pub fn from_config(config: &ScoringConfig) -> (Self, Option<ScoringFallback>) {
        let (strategy, fallback) = ScoringStrategy::from_name(&config.method, config.aggregation);
        if let Some(fb) = &fallback {
            tracing::warn!(method = %config.method, using = %strategy, "{fb}");
        }
        (Self::new(strategy, config), fallback)
    }

    pub fn strategy(&self) -> ScoringStrategy {
        self.strategy
    }

    /// Score every random variable of `snapshot`.
    pub fn score<R: Rng + ?Sized>(&self, snapshot: &ReasonerSnapshot, rng: &mut R) -> ScoreMap {
        tracing::debug!(
            strategy = %self.strategy,
            variables = snapshot.len(),
            invert = self.invert,
            "scoring variables"
        );
        let raw = match self.strategy {
            ScoringStrategy::TruthValue => per_variable(snapshot, |_, s| truth_value_score(s.consensus)),
            ScoringStrategy::Random => snapshot
                .variable_states()
                .keys()
                .map(|a| (a.clone(), rng.gen::<f64>()))
                .collect(),
            ScoringStrategy::Simple => per_variable(snapshot, |_, s| self.simple(snapshot, s)),
            ScoringStrategy::Lagrange(agg) => {
                per_variable(snapshot, |_, s| self.lagrange(snapshot, s, agg, false))
            }
            ScoringStrategy::WeightedLagrange(agg) => {
                per_variable(snapshot, |_, s| self.lagrange(snapshot, s, agg, true))
            }
            ScoringStrategy::Unsatisfied(agg) => {
                per_variable(snapshot, |a, _| self.unsatisfied(snapshot, a, agg, false))
            }
            ScoringStrategy::WeightedUnsatisfied(agg) => {
                per_variable(snapshot, |a, _| self.unsatisfied(snapshot, a, agg, true))
            }
            ScoringStrategy::PrintFeatures => {
                for f in features::extract_all(snapshot, self.constraint_weight) {
                    f.emit();
                }
                per_variable(snapshot, |_, _| 0.0)
            }
        };

        for (atom, score) in &raw {
            tracing::trace!(atom = %atom, score, "raw activation score");
        }

        let scores = if self.invert {
            invert_scores(&raw)
        } else {
            raw
        };
        if self.print_scores {
            for (atom, score) in &scores {
                tracing::info!(target: SCORES_TARGET, atom = %atom, score, "activation score");
            }
        }
        scores
    }

    /// `λ·Σ|y| + ω·max weight`, max weight 0 when no weighted term.
    fn simple(&self, snapshot: &ReasonerSnapshot, state: &VariableState) -> f64 {
        let mut lagrange = 0.0;
        let mut max_weight = 0.0f64;
        for &loc in &state.locations {
            if let Some((y, term)) = snapshot.location(loc) {
                lagrange += y.abs();
                if let Some(w) = term.weight {
                    max_weight = max_weight.max(w);
                }
            }
        }
        self.lagrange_coefficient * lagrange + self.weight_coefficient * max_weight
    }

    fn lagrange(
        &self,
        snapshot: &ReasonerSnapshot,
        state: &VariableState,
        agg: Aggregation,
        weighted: bool,
    ) -> f64 {
        let values: Vec<f64> = state
            .locations
            .iter()
            .filter_map(|&loc| snapshot.location(loc))
            .map(|(y, term)| {
                let lm = y.abs();
                match term.weight {
                    Some(w) if weighted => w * lm,
                    None if weighted => self.constraint_weight * lm,
                    _ => lm,
                }
            })
            .collect();
        agg.apply(&values)
    }

    fn unsatisfied(
        &self,
        snapshot: &ReasonerSnapshot,
        atom: &Atom,
        agg: Aggregation,
        weighted: bool,
    ) -> f64 {
        let value_of = |a: &Atom| snapshot.value_of(a).unwrap_or(0.0);
        let values: Vec<f64> = snapshot
            .kernels_touching(atom)
            .into_iter()
            .map(|kernel| match kernel {
                GroundKernel::Compatibility { weight, .. } => {
                    let inc = kernel.incompatibility(&value_of);
                    if weighted {
                        weight * inc
                    } else {
                        inc
                    }
                }
                GroundKernel::Constraint { .. } => {
                    let inf = kernel.infeasibility(&value_of);
                    if weighted {
                        self.constraint_weight * inf
                    } else {
                        inf
                    }
                }
            })
            .collect();
        agg.apply(&values)
    }
}

fn per_variable<F>(snapshot: &ReasonerSnapshot, mut score: F) -> ScoreMap
where
    F: FnMut(&Atom, &VariableState) -> f64,
{
    snapshot
        .variable_states()
        .iter()
        .map(|(atom, state)| (atom.clone(), score(atom, state)))
        .collect()
}

/// Highest for values near 0.5, lowest near 0 or 1.
pub fn truth_value_score(value: f64) -> f64 {
    1.0 - (0.5 - value).abs()
}

/// Flip the preference order: `s ↦ 1 / (s + 0.01)` for `s ≥ 0`. Negative
/// scores are negated instead, with a warning.
pub fn invert_scores(scores: &ScoreMap) -> ScoreMap {
    scores
        .iter()
        .map(|(atom, &s)| {
            let inverted = if s < 0.0 {
                tracing::warn!(atom = %atom, score = s, "negative score cannot be inverted; negating");
                -s
            } else {
                1.0 / (s + INVERSION_SMOOTHING)
            };
            (atom.clone(), inverted)
        })
        .collect()
}
