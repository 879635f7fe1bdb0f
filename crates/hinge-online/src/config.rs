//! Online inference configuration.
//!
//! Every field is optional in JSON; missing fields take the defaults below.
//!
//! ```json
//! {
//!   "scoring": { "method": "wtlagrangemax", "invert": false },
//!   "selection": "relational",
//!   "activation_percent": 0.1,
//!   "seed": 7,
//!   "solver": { "max_iterations": 5000 }
//! }
//! ```

use crate::error::{OnlineError, Result};
use crate::scoring::Aggregation;
use hinge_admm::AdmmConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Strategy name, matched case-insensitively. Unknown names fall back to
    /// `simple`.
    pub method: String,
    /// Aggregator for bare family names such as `lagrange`.
    pub aggregation: Option<Aggregation>,
    /// Replace every score `s` by `1 / (s + 0.01)`.
    pub invert: bool,
    /// Emit the final score map on the `hinge::scores` tracing target.
    pub print_scores: bool,
    /// Weight given to hard-constraint participations.
    pub constraint_weight: f64,
    pub lagrange_coefficient: f64,
    pub weight_coefficient: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            method: "simple".to_string(),
            aggregation: None,
            invert: false,
            print_scores: false,
            constraint_weight: 1000.0,
            lagrange_coefficient: 1.0,
            weight_coefficient: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Highest scores first.
    #[default]
    TopK,
    /// Draw proportionally to `|score|` without replacement.
    Sampled,
    /// Best-first walk outward from the seeds, priority `score / 2^distance`.
    Relational,
}

/// Which snapshot supplies kernel adjacency and constraint partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSource {
    /// The previous round's snapshot.
    #[default]
    Latest,
    /// The snapshot of the first full solve.
    Initial,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    pub scoring: ScoringConfig,
    pub selection: SelectionPolicy,
    /// Fixed number of random-variable activations per round.
    pub activation_quota: Option<usize>,
    /// Fraction of scorable variables to activate per round.
    pub activation_percent: Option<f64>,
    /// Hard cap on activations once constraint-partner closure starts.
    pub max_activations: Option<usize>,
    /// Seed for sampling and random scoring. Unset draws from OS entropy.
    pub seed: Option<u64>,
    pub structure_source: StructureSource,
    pub solver: AdmmConfig,
}

impl OnlineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: OnlineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.activation_percent {
            if !(0.0..=1.0).contains(&p) {
                return Err(OnlineError::Config(format!(
                    "activation_percent must be in [0, 1], got {p}"
                )));
            }
        }
        if self.scoring.constraint_weight < 0.0 || !self.scoring.constraint_weight.is_finite() {
            return Err(OnlineError::Config(format!(
                "constraint_weight must be a non-negative number, got {}",
                self.scoring.constraint_weight
            )));
        }
        if !(self.solver.step_size > 0.0) {
            return Err(OnlineError::Config(format!(
                "solver.step_size must be positive, got {}",
                self.solver.step_size
            )));
        }
        Ok(())
    }
}
