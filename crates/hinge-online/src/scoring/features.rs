//! Per-variable activation features, emitted by the `printfeatures` strategy.

use crate::snapshot::{ReasonerSnapshot, VariableState};
use hinge_model::Atom;
use serde::Serialize;

/// Tracing target the feature dump is written to.
pub const FEATURES_TARGET: &str = "hinge::features";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationFeatures {
    pub atom: Atom,
    pub truth_value: f64,
    pub max_weight: f64,
    pub avg_weight: f64,
    pub max_lagrange: f64,
    pub avg_lagrange: f64,
    /// Mean of `weight · |y|`, constraints weighted by the constraint weight.
    pub avg_weighted_lagrange: f64,
    /// Number of term participations.
    pub count: usize,
}

impl ActivationFeatures {
    pub fn extract(
        atom: &Atom,
        state: &VariableState,
        snapshot: &ReasonerSnapshot,
        constraint_weight: f64,
    ) -> Self {
        let mut max_weight = 0.0f64;
        let mut max_lagrange = 0.0f64;
        let mut weight_total = 0.0;
        let mut lagrange_total = 0.0;
        let mut weighted_total = 0.0;
        let mut count = 0usize;

        for &loc in &state.locations {
            let Some((y, term)) = snapshot.location(loc) else {
                continue;
            };
            count += 1;
            let lm = y.abs();
            max_lagrange = max_lagrange.max(lm);
            lagrange_total += lm;
            match term.weight {
                Some(w) => {
                    max_weight = max_weight.max(w);
                    weight_total += w;
                    weighted_total += w * lm;
                }
                None => weighted_total += constraint_weight * lm,
            }
        }

        let mean = |total: f64| if count == 0 { 0.0 } else { total / count as f64 };
        Self {
            atom: atom.clone(),
            truth_value: state.consensus,
            max_weight,
            avg_weight: mean(weight_total),
            max_lagrange,
            avg_lagrange: mean(lagrange_total),
            avg_weighted_lagrange: mean(weighted_total),
            count,
        }
    }

    pub fn emit(&self) {
        tracing::info!(
            target: FEATURES_TARGET,
            atom = %self.atom,
            tv = self.truth_value,
            maxwt = self.max_weight,
            avgwt = self.avg_weight,
            maxlm = self.max_lagrange,
            avglm = self.avg_lagrange,
            avgwtlm = self.avg_weighted_lagrange,
            cnt = self.count,
            "activation features"
        );
    }
}

/// Features of every variable in the snapshot, in atom order.
pub fn extract_all(snapshot: &ReasonerSnapshot, constraint_weight: f64) -> Vec<ActivationFeatures> {
    snapshot
        .variable_states()
        .iter()
        .map(|(atom, state)| ActivationFeatures::extract(atom, state, snapshot, constraint_weight))
        .collect()
}
