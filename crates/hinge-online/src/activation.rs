//! The activation set of one round and the rules for growing it.
//!
//! Activating a random variable also activates, transitively, every random
//! variable it shares a hard constraint with. That closure runs no matter
//! which selection policy asked for the activation, so the activation count
//! can overshoot the quota.

use crate::snapshot::ReasonerSnapshot;
use hinge_model::{ActivationEvents, Atom, AtomLookup, AtomRecord, GroundKernel, GroundingSource};
use std::collections::BTreeSet;

/// Atoms live in the current round, in activation order.
#[derive(Debug, Clone, Default)]
pub struct ActivationSet {
    members: BTreeSet<Atom>,
    order: Vec<Atom>,
    random_variables: usize,
}

impl ActivationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `atom` was already active. Only random variables
    /// count toward the quota.
    pub fn insert(&mut self, atom: Atom, random_variable: bool) -> bool {
        if !self.members.insert(atom.clone()) {
            return false;
        }
        self.order.push(atom);
        if random_variable {
            self.random_variables += 1;
        }
        true
    }

    pub fn contains(&self, atom: &Atom) -> bool {
        self.members.contains(atom)
    }

    /// Activations that count toward the quota.
    pub fn random_variable_count(&self) -> usize {
        self.random_variables
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in atom order.
    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.members.iter()
    }

    /// Members in the order they were activated.
    pub fn in_order(&self) -> &[Atom] {
        &self.order
    }
}

// ============================================================================
// Activator
// ============================================================================

/// Grows an [`ActivationSet`] and fires the matching grounding events.
pub struct Activator<'a> {
    lookup: &'a dyn AtomLookup,
    /// Supplies constraint partners.
    structure: &'a ReasonerSnapshot,
    set: ActivationSet,
    events: ActivationEvents,
    max_activations: Option<usize>,
    cap_reached: bool,
}

impl<'a> Activator<'a> {
    pub fn new(
        lookup: &'a dyn AtomLookup,
        structure: &'a ReasonerSnapshot,
        max_activations: Option<usize>,
    ) -> Self {
        Self {
            lookup,
            structure,
            set: ActivationSet::new(),
            events: ActivationEvents::new(),
            max_activations,
            cap_reached: false,
        }
    }

    /// Activate a caller-supplied seed of either kind. Random-variable seeds
    /// count toward the quota and have their constraint partners resolved.
    pub fn seed(&mut self, record: &AtomRecord) -> usize {
        let rv = record.is_random_variable();
        let mut added = 0;
        if self.set.insert(record.atom.clone(), rv) {
            self.events.activate(&record.atom);
            if rv {
                added += 1;
            }
            tracing::trace!(
                atom = %record.atom,
                kind = ?record.kind,
                "activated seed"
            );
        }
        if rv {
            added += self.close_partners(&record.atom);
        }
        added
    }

    /// Activate a scored random variable and its constraint partners.
    /// Returns how many activations this added toward the quota; zero if the
    /// atom is observed, unknown, or already active without new partners.
    pub fn activate_variable(&mut self, atom: &Atom, score: f64) -> usize {
        let is_rv = self
            .lookup
            .lookup(atom)
            .map(|r| r.is_random_variable())
            .unwrap_or(false);
        if !is_rv {
            tracing::trace!(atom = %atom, score, "skipped activating non-variable atom");
            return 0;
        }

        let mut added = 0;
        if self.set.insert(atom.clone(), true) {
            self.events.activate(atom);
            added += 1;
            tracing::trace!(atom = %atom, score, "activated by score");
        }
        added + self.close_partners(atom)
    }

    /// Transitive constraint-partner closure from `start`.
    fn close_partners(&mut self, start: &Atom) -> usize {
        let mut added = 0;
        let mut work = vec![start.clone()];
        while let Some(atom) = work.pop() {
            for partner in self.structure.constraint_partners(&atom) {
                if self.set.contains(&partner) {
                    continue;
                }
                let is_rv = self
                    .lookup
                    .lookup(&partner)
                    .map(|r| r.is_random_variable())
                    .unwrap_or(false);
                if !is_rv {
                    continue;
                }
                if self.at_cap() {
                    if !self.cap_reached {
                        self.cap_reached = true;
                        tracing::warn!(
                            cap = self.max_activations,
                            "activation cap reached; remaining constraint partners will be clamped"
                        );
                    }
                    return added;
                }
                tracing::trace!(atom = %partner, via = %atom, "activated by constraint");
                self.set.insert(partner.clone(), true);
                self.events.activate(&partner);
                added += 1;
                work.push(partner);
            }
        }
        added
    }

    fn at_cap(&self) -> bool {
        self.max_activations
            .map(|cap| self.set.random_variable_count() >= cap)
            .unwrap_or(false)
    }

    /// Activations counting toward the quota so far.
    pub fn activated_count(&self) -> usize {
        self.set.random_variable_count()
    }

    pub fn activation_set(&self) -> &ActivationSet {
        &self.set
    }

    pub fn cap_reached(&self) -> bool {
        self.cap_reached
    }

    /// Ground every kernel touching an activated atom into `sink`, repeating
    /// while grounding uncovers random variables that `prior` has no value
    /// for (they cannot be clamped, so they join the activation set).
    pub fn ground_pending<G, F, E>(
        &mut self,
        source: &G,
        prior: &ReasonerSnapshot,
        mut sink: F,
    ) -> Result<usize, E>
    where
        G: GroundingSource + ?Sized,
        F: FnMut(GroundKernel) -> Result<(), E>,
    {
        let lookup = self.lookup;
        let mut grounded = 0;
        while self.events.pending_jobs() > 0 {
            grounded += self.events.work_off(source, &mut sink)?;
            let fresh = self.events.check_to_activate(|a| {
                !prior.contains_variable(a)
                    && lookup
                        .lookup(a)
                        .map(|r| r.is_random_variable())
                        .unwrap_or(false)
            });
            for atom in fresh {
                tracing::trace!(atom = %atom, "activated by grounding");
                self.set.insert(atom, true);
            }
        }
        Ok(grounded)
    }

    pub fn into_set(self) -> ActivationSet {
        self.set
    }
}
