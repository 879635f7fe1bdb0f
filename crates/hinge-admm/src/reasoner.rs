//! The consensus ADMM reasoner.
//!
//! ```text
//!   for each iteration:
//!     ┌──────────── parallel over terms ────────────┐
//!     │ y += ρ (x − z);  x = argmin f(x) + ρ/2‖x − z + y/ρ‖² │
//!     └──────────────────────┬──────────────────────┘
//!                            │ barrier
//!     ┌──────── parallel over variables ────────┐
//!     │ z_i = clip(mean over locations of x + y/ρ) │   (one writer per z_i)
//!     └──────────────────────┬──────────────────┘
//!                            ▼
//!                 primal / dual residual check
//! ```

use crate::config::AdmmConfig;
use crate::error::{Result, SolverError};
use crate::term::{AdmmTerm, TermKind};
use crate::view::{ConsensusView, TermId, VariableLocation};
use ahash::{AHashMap, AHashSet};
use hinge_model::{
    infeasibility_norm, total_weighted_incompatibility, Atom, AtomKind, AtomLookup, GroundKernel,
    KernelKey,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of [`ConsensusSolver::optimize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub converged: bool,
    pub iterations: usize,
    pub primal_residual: f64,
    pub dual_residual: f64,
}

/// A single-use consensus solver.
pub trait ConsensusSolver: ConsensusView + Send {
    /// Add a kernel to the problem. Kernels already present are ignored.
    /// Returns the new term, or `None` when nothing new was added or every
    /// atom of the kernel is observed.
    fn add_ground_kernel(
        &mut self,
        kernel: GroundKernel,
        lookup: &dyn AtomLookup,
    ) -> Result<Option<TermId>>;

    fn set_variable_bounds(&mut self, atom: &Atom, lower: f64, upper: f64) -> Result<()>;

    /// Run to convergence or until the iteration budget is spent.
    fn optimize(&mut self) -> SolveOutcome;

    /// Number of kernels in the problem.
    fn size(&self) -> usize;

    fn compatibility_kernels(&self) -> Vec<&GroundKernel>;

    fn constraint_kernels(&self) -> Vec<&GroundKernel>;

    fn consensus_value(&self, atom: &Atom) -> Option<f64>;

    /// Consensus value of a variable, or the folded-in value of an observed
    /// atom.
    fn value_of(&self, atom: &Atom) -> Option<f64>;

    fn total_weighted_incompatibility(&self) -> f64 {
        total_weighted_incompatibility(self.compatibility_kernels(), |a| {
            self.value_of(a).unwrap_or(0.0)
        })
    }

    fn infeasibility_norm(&self) -> f64 {
        infeasibility_norm(self.constraint_kernels(), |a| self.value_of(a).unwrap_or(0.0))
    }
}

/// Builds a fresh solver for every round.
pub trait SolverFactory: Send + Sync {
    type Solver: ConsensusSolver;

    fn create(&self) -> Result<Self::Solver>;
}

// ============================================================================
// ADMM Reasoner
// ============================================================================

pub struct AdmmReasoner {
    config: AdmmConfig,
    kernels: Vec<GroundKernel>,
    keys: AHashSet<KernelKey>,
    terms: Vec<AdmmTerm>,
    /// Kernel index of each term.
    term_kernel: Vec<usize>,
    variables: Vec<Atom>,
    var_index: AHashMap<Atom, usize>,
    z: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    locations: Vec<Vec<VariableLocation>>,
    observed: BTreeMap<Atom, f64>,
}

impl AdmmReasoner {
    pub fn new(config: AdmmConfig) -> Result<Self> {
        if !(config.step_size > 0.0) {
            return Err(SolverError::InvalidConfig(format!(
                "step size must be positive, got {}",
                config.step_size
            )));
        }
        if config.epsilon_abs < 0.0 || config.epsilon_rel < 0.0 {
            return Err(SolverError::InvalidConfig(
                "residual tolerances must be non-negative".to_string(),
            ));
        }
        Ok(Self {
            config,
            kernels: Vec::new(),
            keys: AHashSet::new(),
            terms: Vec::new(),
            term_kernel: Vec::new(),
            variables: Vec::new(),
            var_index: AHashMap::new(),
            z: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            locations: Vec::new(),
            observed: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &AdmmConfig {
        &self.config
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    fn variable_for(&mut self, atom: &Atom, initial: f64) -> usize {
        if let Some(&idx) = self.var_index.get(atom) {
            return idx;
        }
        let idx = self.variables.len();
        self.variables.push(atom.clone());
        self.var_index.insert(atom.clone(), idx);
        self.z.push(initial.clamp(0.0, 1.0));
        self.lower.push(0.0);
        self.upper.push(1.0);
        self.locations.push(Vec::new());
        idx
    }

    /// `(Σ (x − z)², Σ x², Σ y²)` over every local copy. Partial sums are
    /// collected in term order and added sequentially so results do not
    /// depend on thread scheduling.
    fn residual_sums(&self) -> (f64, f64, f64) {
        let z = &self.z;
        let parts: Vec<(f64, f64, f64)> =
            self.terms.par_iter().map(|t| t.residual_parts(z)).collect();
        parts
            .into_iter()
            .fold((0.0, 0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1, acc.2 + p.2))
    }
}

impl ConsensusView for AdmmReasoner {
    fn variables(&self) -> &[Atom] {
        &self.variables
    }

    fn consensus(&self) -> &[f64] {
        &self.z
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    fn locations(&self, variable: usize) -> &[VariableLocation] {
        self.locations.get(variable).map(Vec::as_slice).unwrap_or(&[])
    }

    fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn term_variables(&self, term: TermId) -> &[usize] {
        &self.terms[term].z_indices
    }

    fn term_duals(&self, term: TermId) -> &[f64] {
        self.terms[term].duals()
    }

    fn term_weight(&self, term: TermId) -> Option<f64> {
        self.terms[term].weight()
    }

    fn term_kernel(&self, term: TermId) -> &GroundKernel {
        &self.kernels[self.term_kernel[term]]
    }

    fn observed_values(&self) -> Vec<(Atom, f64)> {
        self.observed.iter().map(|(a, v)| (a.clone(), *v)).collect()
    }
}

impl ConsensusSolver for AdmmReasoner {
    fn add_ground_kernel(
        &mut self,
        kernel: GroundKernel,
        lookup: &dyn AtomLookup,
    ) -> Result<Option<TermId>> {
        if !self.keys.insert(kernel.key()) {
            return Ok(None);
        }

        let mut constant = kernel.form().constant;
        let mut z_indices = Vec::new();
        let mut coeffs = Vec::new();
        for (atom, coeff) in &kernel.form().terms {
            let record = lookup.lookup(atom).ok_or_else(|| SolverError::UnknownAtom {
                rule: kernel.rule().to_string(),
                atom: atom.to_string(),
            })?;
            match record.kind {
                AtomKind::Observed => {
                    constant += coeff * record.value;
                    self.observed.insert(record.atom, record.value);
                }
                AtomKind::RandomVariable => {
                    z_indices.push(self.variable_for(&record.atom, record.value));
                    coeffs.push(*coeff);
                }
            }
        }

        let kind = match &kernel {
            GroundKernel::Compatibility {
                weight, squared, ..
            } => {
                if *squared {
                    TermKind::SquaredHinge { weight: *weight }
                } else {
                    TermKind::Hinge { weight: *weight }
                }
            }
            GroundKernel::Constraint { comparator, .. } => TermKind::Constraint(*comparator),
        };

        let kernel_idx = self.kernels.len();
        self.kernels.push(kernel);
        if z_indices.is_empty() {
            return Ok(None);
        }

        let term_id = self.terms.len();
        for (local, &var) in z_indices.iter().enumerate() {
            self.locations[var].push(VariableLocation {
                term: term_id,
                local,
            });
        }
        self.terms
            .push(AdmmTerm::new(z_indices, coeffs, constant, kind, &self.z));
        self.term_kernel.push(kernel_idx);
        Ok(Some(term_id))
    }

    fn set_variable_bounds(&mut self, atom: &Atom, lower: f64, upper: f64) -> Result<()> {
        let idx = *self
            .var_index
            .get(atom)
            .ok_or_else(|| SolverError::UnknownVariable(atom.to_string()))?;
        if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower > upper {
            return Err(SolverError::InvalidBounds {
                atom: atom.to_string(),
                lower,
                upper,
            });
        }
        self.lower[idx] = lower;
        self.upper[idx] = upper;
        self.z[idx] = self.z[idx].clamp(lower, upper);
        Ok(())
    }

    fn optimize(&mut self) -> SolveOutcome {
        let step = self.config.step_size;
        let check_interval = self.config.check_interval.max(1);
        let local_copies: usize = self.terms.iter().map(AdmmTerm::len).sum();
        let mut outcome = SolveOutcome {
            converged: true,
            iterations: 0,
            primal_residual: 0.0,
            dual_residual: 0.0,
        };
        if local_copies == 0 {
            return outcome;
        }
        outcome.converged = false;
        let sqrt_n = (local_copies as f64).sqrt();

        for iteration in 1..=self.config.max_iterations {
            {
                let z = &self.z;
                self.terms.par_iter_mut().for_each(|term| {
                    term.update_duals(z, step);
                    term.minimize(z, step);
                });
            }

            let new_z: Vec<f64> = {
                let terms = &self.terms;
                let z = &self.z;
                let (lower, upper) = (&self.lower, &self.upper);
                self.locations
                    .par_iter()
                    .enumerate()
                    .map(|(i, locs)| {
                        if locs.is_empty() {
                            return z[i];
                        }
                        let total: f64 = locs
                            .iter()
                            .map(|l| {
                                let t = &terms[l.term];
                                t.x[l.local] + t.y[l.local] / step
                            })
                            .sum();
                        (total / locs.len() as f64).clamp(lower[i], upper[i])
                    })
                    .collect()
            };

            let mut dual_sq = 0.0;
            let mut z_sq = 0.0;
            for (i, locs) in self.locations.iter().enumerate() {
                let count = locs.len() as f64;
                let delta = new_z[i] - self.z[i];
                dual_sq += count * delta * delta;
                z_sq += count * new_z[i] * new_z[i];
            }
            self.z = new_z;
            outcome.iterations = iteration;

            if iteration % check_interval != 0 {
                continue;
            }
            let (primal_sq, x_sq, y_sq) = self.residual_sums();
            outcome.primal_residual = primal_sq.sqrt();
            outcome.dual_residual = step * dual_sq.sqrt();
            let eps_primal = self.config.epsilon_abs * sqrt_n
                + self.config.epsilon_rel * x_sq.sqrt().max(z_sq.sqrt());
            let eps_dual = self.config.epsilon_abs * sqrt_n + self.config.epsilon_rel * y_sq.sqrt();
            tracing::trace!(
                iteration,
                primal = outcome.primal_residual,
                dual = outcome.dual_residual,
                "admm residuals"
            );
            if outcome.primal_residual <= eps_primal && outcome.dual_residual <= eps_dual {
                outcome.converged = true;
                break;
            }
        }

        if outcome.converged {
            tracing::debug!(
                iterations = outcome.iterations,
                terms = self.terms.len(),
                variables = self.variables.len(),
                "admm converged"
            );
        } else {
            tracing::warn!(
                iterations = outcome.iterations,
                primal = outcome.primal_residual,
                dual = outcome.dual_residual,
                "admm exhausted its iteration budget without converging"
            );
        }
        outcome
    }

    fn size(&self) -> usize {
        self.kernels.len()
    }

    fn compatibility_kernels(&self) -> Vec<&GroundKernel> {
        self.kernels.iter().filter(|k| !k.is_constraint()).collect()
    }

    fn constraint_kernels(&self) -> Vec<&GroundKernel> {
        self.kernels.iter().filter(|k| k.is_constraint()).collect()
    }

    fn consensus_value(&self, atom: &Atom) -> Option<f64> {
        self.var_index.get(atom).map(|&i| self.z[i])
    }

    fn value_of(&self, atom: &Atom) -> Option<f64> {
        self.consensus_value(atom)
            .or_else(|| self.observed.get(atom).copied())
    }
}

/// Hands out fresh [`AdmmReasoner`]s sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct AdmmReasonerFactory {
    config: AdmmConfig,
}

impl AdmmReasonerFactory {
    pub fn new(config: AdmmConfig) -> Self {
        Self { config }
    }
}

impl SolverFactory for AdmmReasonerFactory {
    type Solver = AdmmReasoner;

    fn create(&self) -> Result<AdmmReasoner> {
        AdmmReasoner::new(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hinge_model::{atom, AtomKind, Comparator, LinearForm, MemoryStore};

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.register_predicate("Friends", 2);
        store.register_predicate("Votes", 1);
        store
            .insert(atom!("Friends", "a", "b"), AtomKind::Observed, 1.0)
            .unwrap();
        store
            .insert(atom!("Votes", "a"), AtomKind::Observed, 0.9)
            .unwrap();
        store
            .insert(atom!("Votes", "b"), AtomKind::RandomVariable, 0.0)
            .unwrap();
        store
            .insert(atom!("Votes", "c"), AtomKind::RandomVariable, 0.0)
            .unwrap();
        store
    }

    /// Friends(a, b) ∧ Votes(a) → Votes(b)
    fn friends_vote(weight: f64) -> GroundKernel {
        GroundKernel::compatibility(
            "friends_vote",
            weight,
            LinearForm::new()
                .term(atom!("Friends", "a", "b"), 1.0)
                .term(atom!("Votes", "a"), 1.0)
                .term(atom!("Votes", "b"), -1.0)
                .constant(-1.0),
        )
    }

    fn reasoner() -> AdmmReasoner {
        AdmmReasoner::new(AdmmConfig {
            epsilon_abs: 1e-7,
            epsilon_rel: 1e-5,
            ..AdmmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_observed_atoms_fold_into_constants() {
        let store = store();
        let mut r = reasoner();
        let term = r.add_ground_kernel(friends_vote(1.0), &store).unwrap();
        assert_eq!(term, Some(0));
        assert_eq!(r.variables(), &[atom!("Votes", "b")]);
        assert_eq!(r.observed_values().len(), 2);
        assert_eq!(r.term_variables(0), &[0]);
        assert_eq!(r.locations(0), &[VariableLocation { term: 0, local: 0 }]);
    }

    #[test]
    fn test_duplicate_kernels_are_ignored() {
        let store = store();
        let mut r = reasoner();
        r.add_ground_kernel(friends_vote(1.0), &store).unwrap();
        assert_eq!(r.add_ground_kernel(friends_vote(1.0), &store).unwrap(), None);
        assert_eq!(r.size(), 1);
        assert_eq!(r.term_count(), 1);
    }

    #[test]
    fn test_clamps_on_lookalike_atoms_are_both_kept() {
        let store = MemoryStore::new();
        store.register_predicate("V", 1);
        store
            .insert(atom!("V", 1i64), AtomKind::RandomVariable, 0.5)
            .unwrap();
        store
            .insert(atom!("V", "1"), AtomKind::RandomVariable, 0.5)
            .unwrap();

        let mut r = reasoner();
        let first = r
            .add_ground_kernel(GroundKernel::value_constraint(atom!("V", 1i64), 0.1), &store)
            .unwrap();
        let second = r
            .add_ground_kernel(GroundKernel::value_constraint(atom!("V", "1"), 0.1), &store)
            .unwrap();
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));
        assert_eq!(r.size(), 2);
        assert!(r.consensus_value(&atom!("V", "1")).is_some());
    }

    #[test]
    fn test_unknown_atom_is_an_error() {
        let store = store();
        let mut r = reasoner();
        let kernel = GroundKernel::compatibility(
            "r",
            1.0,
            LinearForm::new().term(atom!("Votes", "zed"), 1.0),
        );
        assert!(matches!(
            r.add_ground_kernel(kernel, &store),
            Err(SolverError::UnknownAtom { .. })
        ));
    }

    #[test]
    fn test_single_rule_pushes_variable_up() {
        let store = store();
        let mut r = reasoner();
        r.add_ground_kernel(friends_vote(1.0), &store).unwrap();
        let outcome = r.optimize();
        assert!(outcome.converged);
        let b = r.consensus_value(&atom!("Votes", "b")).unwrap();
        assert_relative_eq!(b, 0.9, epsilon = 1e-3);
        assert!(r.total_weighted_incompatibility() < 1e-3);
    }

    #[test]
    fn test_value_constraint_wins_over_rule() {
        let store = store();
        let mut r = reasoner();
        r.add_ground_kernel(friends_vote(5.0), &store).unwrap();
        r.add_ground_kernel(GroundKernel::value_constraint(atom!("Votes", "b"), 0.2), &store)
            .unwrap();
        let outcome = r.optimize();
        assert!(outcome.converged);
        assert_relative_eq!(
            r.consensus_value(&atom!("Votes", "b")).unwrap(),
            0.2,
            epsilon = 1e-3
        );
        assert!(r.infeasibility_norm() < 1e-3);
        assert_relative_eq!(r.total_weighted_incompatibility(), 3.5, epsilon = 1e-2);
    }

    #[test]
    fn test_functional_constraint_splits_mass() {
        let store = store();
        let mut r = reasoner();
        r.add_ground_kernel(
            GroundKernel::constraint(
                "functional",
                Comparator::Equality,
                LinearForm::new()
                    .term(atom!("Votes", "b"), 1.0)
                    .term(atom!("Votes", "c"), 1.0)
                    .constant(-1.0),
            ),
            &store,
        )
        .unwrap();
        r.add_ground_kernel(friends_vote(1.0), &store).unwrap();
        let outcome = r.optimize();
        assert!(outcome.converged);
        let b = r.consensus_value(&atom!("Votes", "b")).unwrap();
        let c = r.consensus_value(&atom!("Votes", "c")).unwrap();
        assert_relative_eq!(b + c, 1.0, epsilon = 1e-3);
        assert!(b >= 0.9 - 1e-2);
    }

    #[test]
    fn test_bounds_are_respected() {
        let store = store();
        let mut r = reasoner();
        r.add_ground_kernel(friends_vote(1.0), &store).unwrap();
        r.set_variable_bounds(&atom!("Votes", "b"), 0.0, 0.5).unwrap();
        r.optimize();
        assert!(r.consensus_value(&atom!("Votes", "b")).unwrap() <= 0.5 + 1e-12);
        assert!(matches!(
            r.set_variable_bounds(&atom!("Votes", "b"), 0.7, 0.2),
            Err(SolverError::InvalidBounds { .. })
        ));
        assert!(matches!(
            r.set_variable_bounds(&atom!("Votes", "zed"), 0.0, 1.0),
            Err(SolverError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let store = store();
        let mut r = AdmmReasoner::new(AdmmConfig {
            max_iterations: 1,
            epsilon_abs: 0.0,
            epsilon_rel: 0.0,
            ..AdmmConfig::default()
        })
        .unwrap();
        r.add_ground_kernel(friends_vote(1.0), &store).unwrap();
        let outcome = r.optimize();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn test_empty_problem_converges_trivially() {
        let mut r = reasoner();
        let outcome = r.optimize();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn test_invalid_step_size() {
        assert!(AdmmReasoner::new(AdmmConfig {
            step_size: 0.0,
            ..AdmmConfig::default()
        })
        .is_err());
    }
}
