//! Read-only access to a solver's internal arrays.
//!
//! Terms and variables live in flat arenas; a variable's participation in a
//! term is the plain pair `(term, local index)`.

use hinge_model::{Atom, GroundKernel};

/// Stable handle of a term within one solve.
pub type TermId = usize;

/// One participation of a consensus variable: the `local`-th copy in `term`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableLocation {
    pub term: TermId,
    pub local: usize,
}

/// What a snapshot needs to read from a converged solve.
pub trait ConsensusView {
    /// Consensus variables, indexed by variable handle.
    fn variables(&self) -> &[Atom];
    fn consensus(&self) -> &[f64];
    fn lower_bounds(&self) -> &[f64];
    fn upper_bounds(&self) -> &[f64];
    fn locations(&self, variable: usize) -> &[VariableLocation];

    fn term_count(&self) -> usize;
    /// Variable handle of each local copy of `term`.
    fn term_variables(&self, term: TermId) -> &[usize];
    fn term_duals(&self, term: TermId) -> &[f64];
    /// Rule weight, `None` for hard constraints.
    fn term_weight(&self, term: TermId) -> Option<f64>;
    fn term_kernel(&self, term: TermId) -> &GroundKernel;

    /// Values of the observed atoms folded into term constants.
    fn observed_values(&self) -> Vec<(Atom, f64)>;
}
