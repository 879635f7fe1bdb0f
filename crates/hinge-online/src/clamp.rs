//! Value constraints that hold non-activated variables at their previous
//! consensus while the activated region is re-solved.

use crate::activation::ActivationSet;
use crate::snapshot::ReasonerSnapshot;
use hinge_model::{Atom, AtomLookup, GroundKernel};

#[derive(Debug, Clone, PartialEq)]
pub struct Clamp {
    pub atom: Atom,
    pub value: f64,
}

impl Clamp {
    /// The synthetic `atom == value` constraint.
    pub fn kernel(&self) -> GroundKernel {
        GroundKernel::value_constraint(self.atom.clone(), self.value)
    }
}

/// One clamp per variable of `previous` that is not active this round and is
/// still a random variable in the store, in atom order.
pub fn plan_clamps(previous: &ReasonerSnapshot, active: &ActivationSet, store: &dyn AtomLookup) -> Vec<Clamp> {
    let mut clamps = Vec::new();
    for (atom, state) in previous.variable_states() {
        if active.contains(atom) {
            continue;
        }
        let still_variable = store
            .lookup(atom)
            .map(|r| r.is_random_variable())
            .unwrap_or(false);
        if !still_variable {
            tracing::trace!(atom = %atom, "not clamped; no longer a random variable");
            continue;
        }
        tracing::trace!(atom = %atom, value = state.consensus, "clamped to consensus");
        clamps.push(Clamp {
            atom: atom.clone(),
            value: state.consensus,
        });
    }
    clamps
}
