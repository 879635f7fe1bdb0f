//! Immutable, atom-indexed extract of a converged solve.
//!
//! A snapshot copies what the activation layer needs out of the solver's
//! arenas: per-variable consensus state and locations, the kernel behind each
//! term with its duals, kernel adjacency by atom, and which random variables
//! share a hard constraint. The solver is dropped afterwards; only the
//! snapshot crosses into the next round.

use ahash::AHashMap;
use hinge_admm::{ConsensusView, VariableLocation};
use hinge_model::{Atom, GroundKernel};
use std::collections::{BTreeMap, BTreeSet};

/// Consensus state of one random variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableState {
    pub consensus: f64,
    pub lower: f64,
    pub upper: f64,
    /// Every `(term, local)` participation; an atom occurring twice in a
    /// kernel has two.
    pub locations: Vec<VariableLocation>,
}

/// One solver term and the kernel that produced it.
#[derive(Debug, Clone)]
pub struct TermRecord {
    pub kernel: GroundKernel,
    pub duals: Vec<f64>,
    pub weight: Option<f64>,
}

impl TermRecord {
    pub fn is_constraint(&self) -> bool {
        self.weight.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReasonerSnapshot {
    variables: BTreeMap<Atom, VariableState>,
    terms: Vec<TermRecord>,
    atom_kernels: AHashMap<Atom, Vec<usize>>,
    constrained_pairs: AHashMap<Atom, BTreeSet<Atom>>,
    observed: AHashMap<Atom, f64>,
}

impl ReasonerSnapshot {
    /// Copy the state of a solved problem.
    pub fn from_view<V: ConsensusView + ?Sized>(view: &V) -> Self {
        let atoms = view.variables();
        let z = view.consensus();
        let lower = view.lower_bounds();
        let upper = view.upper_bounds();

        let variables = atoms
            .iter()
            .enumerate()
            .map(|(i, atom)| {
                let state = VariableState {
                    consensus: z[i],
                    lower: lower[i],
                    upper: upper[i],
                    locations: view.locations(i).to_vec(),
                };
                (atom.clone(), state)
            })
            .collect();

        let mut terms = Vec::with_capacity(view.term_count());
        let mut atom_kernels: AHashMap<Atom, Vec<usize>> = AHashMap::new();
        let mut constrained_pairs: AHashMap<Atom, BTreeSet<Atom>> = AHashMap::new();

        for t in 0..view.term_count() {
            let kernel = view.term_kernel(t).clone();
            let weight = view.term_weight(t);

            if weight.is_none() {
                let members = view.term_variables(t);
                for &i in members {
                    for &j in members {
                        if atoms[i] != atoms[j] {
                            constrained_pairs
                                .entry(atoms[i].clone())
                                .or_default()
                                .insert(atoms[j].clone());
                        }
                    }
                }
            }

            for atom in kernel.atoms() {
                let slots = atom_kernels.entry(atom.clone()).or_default();
                if slots.last() != Some(&t) {
                    slots.push(t);
                }
            }

            terms.push(TermRecord {
                kernel,
                duals: view.term_duals(t).to_vec(),
                weight,
            });
        }

        Self {
            variables,
            terms,
            atom_kernels,
            constrained_pairs,
            observed: view.observed_values().into_iter().collect(),
        }
    }

    /// Random variables of the solve, in atom order.
    pub fn variable_states(&self) -> &BTreeMap<Atom, VariableState> {
        &self.variables
    }

    pub fn variable(&self, atom: &Atom) -> Option<&VariableState> {
        self.variables.get(atom)
    }

    pub fn contains_variable(&self, atom: &Atom) -> bool {
        self.variables.contains_key(atom)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Dual value and owning term of one participation.
    pub fn location(&self, loc: VariableLocation) -> Option<(f64, &TermRecord)> {
        let term = self.terms.get(loc.term)?;
        term.duals.get(loc.local).map(|&y| (y, term))
    }

    /// Kernels in which `atom` appears, each once. Empty for unknown atoms.
    pub fn kernels_touching(&self, atom: &Atom) -> Vec<&GroundKernel> {
        self.atom_kernels
            .get(atom)
            .map(|slots| slots.iter().map(|&t| &self.terms[t].kernel).collect())
            .unwrap_or_default()
    }

    /// Random variables sharing a hard constraint with `atom`. Empty if none.
    pub fn constraint_partners(&self, atom: &Atom) -> BTreeSet<Atom> {
        self.constrained_pairs.get(atom).cloned().unwrap_or_default()
    }

    /// Every other atom sharing a kernel with `atom`.
    pub fn related_atoms(&self, atom: &Atom) -> BTreeSet<Atom> {
        self.kernels_touching(atom)
            .into_iter()
            .flat_map(|k| k.atoms())
            .filter(|a| *a != atom)
            .cloned()
            .collect()
    }

    /// Consensus value of a variable, else the value of an observed atom.
    pub fn value_of(&self, atom: &Atom) -> Option<f64> {
        self.variables
            .get(atom)
            .map(|v| v.consensus)
            .or_else(|| self.observed.get(atom).copied())
    }
}
