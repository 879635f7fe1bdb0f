//! Grounding: where ground kernels come from, and the "atom activated" event
//! queue that grounds them on demand.
//!
//! ```text
//!  activate(atom) ──► pending jobs ──► work_off ──► kernels touching atom ──► solver
//!                          ▲                                │
//!                          └──── check_to_activate ◄────────┘
//!                                (new random variables seen in fresh kernels)
//! ```

use crate::atom::Atom;
use crate::kernel::{GroundKernel, KernelKey};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Source of ground kernels.
pub trait GroundingSource: Send + Sync {
    /// Every kernel of the model (first, non-incremental round).
    fn ground_all(&self) -> Vec<GroundKernel>;

    /// Every kernel in which `atom` participates.
    fn kernels_touching(&self, atom: &Atom) -> Vec<GroundKernel>;

    /// Hard constraints in which `atom` participates.
    fn constraints_touching(&self, atom: &Atom) -> Vec<GroundKernel> {
        self.kernels_touching(atom)
            .into_iter()
            .filter(GroundKernel::is_constraint)
            .collect()
    }
}

// ============================================================================
// Ground Program
// ============================================================================

/// A pre-ground program indexed by atom.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<GroundKernel>", into = "Vec<GroundKernel>")]
pub struct GroundProgram {
    kernels: Vec<GroundKernel>,
    by_atom: AHashMap<Atom, Vec<usize>>,
}

impl GroundProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kernel: GroundKernel) -> usize {
        let idx = self.kernels.len();
        for atom in kernel.atoms() {
            let slots = self.by_atom.entry(atom.clone()).or_default();
            if slots.last() != Some(&idx) {
                slots.push(idx);
            }
        }
        self.kernels.push(kernel);
        idx
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn kernels(&self) -> &[GroundKernel] {
        &self.kernels
    }
}

impl From<Vec<GroundKernel>> for GroundProgram {
    fn from(kernels: Vec<GroundKernel>) -> Self {
        let mut program = GroundProgram::new();
        for k in kernels {
            program.add(k);
        }
        program
    }
}

impl From<GroundProgram> for Vec<GroundKernel> {
    fn from(program: GroundProgram) -> Self {
        program.kernels
    }
}

impl GroundingSource for GroundProgram {
    fn ground_all(&self) -> Vec<GroundKernel> {
        self.kernels.clone()
    }

    fn kernels_touching(&self, atom: &Atom) -> Vec<GroundKernel> {
        self.by_atom
            .get(atom)
            .map(|slots| slots.iter().map(|&i| self.kernels[i].clone()).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Activation Events
// ============================================================================

/// Pending on-demand grounding work for one round.
#[derive(Debug, Default)]
pub struct ActivationEvents {
    pending: VecDeque<Atom>,
    activated: AHashSet<Atom>,
    grounded: AHashSet<KernelKey>,
    /// Atoms referenced by kernels grounded since the last
    /// [`check_to_activate`](Self::check_to_activate).
    discovered: Vec<Atom>,
}

impl ActivationEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the "atom activated" event. Returns `false` if it already fired
    /// this round.
    pub fn activate(&mut self, atom: &Atom) -> bool {
        if !self.activated.insert(atom.clone()) {
            return false;
        }
        self.pending.push_back(atom.clone());
        true
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Ground every kernel touching a pending atom into `sink`, each at most
    /// once per round. Returns the number of kernels handed to `sink`.
    pub fn work_off<G, F, E>(&mut self, source: &G, mut sink: F) -> Result<usize, E>
    where
        G: GroundingSource + ?Sized,
        F: FnMut(GroundKernel) -> Result<(), E>,
    {
        let mut added = 0;
        while let Some(atom) = self.pending.pop_front() {
            for kernel in source.kernels_touching(&atom) {
                if !self.grounded.insert(kernel.key()) {
                    continue;
                }
                self.discovered.extend(kernel.atoms().cloned());
                sink(kernel)?;
                added += 1;
            }
        }
        tracing::trace!(kernels = added, "worked off grounding jobs");
        Ok(added)
    }

    /// Activate atoms first seen in freshly grounded kernels that `eligible`
    /// accepts. Returns them in atom order; each is queued for grounding.
    pub fn check_to_activate<F>(&mut self, eligible: F) -> Vec<Atom>
    where
        F: Fn(&Atom) -> bool,
    {
        let mut discovered = std::mem::take(&mut self.discovered);
        discovered.sort();
        discovered.dedup();
        let mut out = Vec::new();
        for atom in discovered {
            if !self.activated.contains(&atom) && eligible(&atom) && self.activate(&atom) {
                out.push(atom);
            }
        }
        out
    }
}
