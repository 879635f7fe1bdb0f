//! The atom store: the persistent fact base that inference reads seeds from
//! and commits values to.
//!
//! Reads and writes each take the lock for one operation only; nothing holds
//! the store across an inference round.

use crate::atom::{Argument, Atom, AtomKind, AtomRecord};
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown predicate `{0}`")]
    UnknownPredicate(String),

    #[error("predicate `{predicate}` takes {expected} arguments, got {actual}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        actual: usize,
    },

    #[error("no such atom: {0}")]
    UnknownAtom(String),

    #[error("atom {0} is observed; only random variables can be persisted")]
    ObservedAtom(String),

    #[error("value {value} for {atom} is outside [0, 1]")]
    ValueOutOfRange { atom: String, value: f64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Store Traits
// ============================================================================

/// Read access to atom kinds and values.
pub trait AtomLookup {
    fn lookup(&self, atom: &Atom) -> Option<AtomRecord>;

    fn value_of(&self, atom: &Atom) -> Option<f64> {
        self.lookup(atom).map(|r| r.value)
    }
}

/// The fact store consumed by the round controller.
pub trait AtomStore: AtomLookup + Send + Sync {
    /// Resolve `(predicate, args)` to the store's atom. Equal inputs always
    /// resolve to the same atom.
    fn resolve(&self, predicate: &str, args: &[Argument]) -> Result<AtomRecord>;

    /// Commit a random variable's value.
    fn persist_value(&self, atom: &Atom, value: f64) -> Result<()>;

    /// Every random-variable atom, in atom order.
    fn random_variables(&self) -> Vec<Atom>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct AtomEntry {
    kind: AtomKind,
    value: f64,
}

/// In-memory [`AtomStore`] with registered predicates.
#[derive(Default)]
pub struct MemoryStore {
    predicates: RwLock<AHashMap<String, usize>>,
    atoms: RwLock<AHashMap<Atom, AtomEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_predicate(&self, name: impl Into<String>, arity: usize) {
        self.predicates.write().insert(name.into(), arity);
    }

    fn check_signature(&self, predicate: &str, args: &[Argument]) -> Result<()> {
        let predicates = self.predicates.read();
        let expected = *predicates
            .get(predicate)
            .ok_or_else(|| StoreError::UnknownPredicate(predicate.to_string()))?;
        if expected != args.len() {
            return Err(StoreError::ArityMismatch {
                predicate: predicate.to_string(),
                expected,
                actual: args.len(),
            });
        }
        Ok(())
    }

    /// Insert or overwrite an atom. Returns the stored atom.
    pub fn insert(&self, atom: Atom, kind: AtomKind, value: f64) -> Result<Atom> {
        self.check_signature(atom.predicate(), atom.args())?;
        check_range(&atom, value)?;
        let mut atoms = self.atoms.write();
        if let Some((existing, entry)) = atoms.get_key_value(&atom) {
            let existing = existing.clone();
            if entry.kind != kind || entry.value != value {
                atoms.insert(existing.clone(), AtomEntry { kind, value });
            }
            return Ok(existing);
        }
        atoms.insert(atom.clone(), AtomEntry { kind, value });
        Ok(atom)
    }

    /// Change an atom's value regardless of kind (evidence updates between
    /// rounds).
    pub fn update_value(&self, atom: &Atom, value: f64) -> Result<()> {
        check_range(atom, value)?;
        let mut atoms = self.atoms.write();
        let entry = atoms
            .get_mut(atom)
            .ok_or_else(|| StoreError::UnknownAtom(atom.to_string()))?;
        entry.value = value;
        Ok(())
    }

    pub fn remove(&self, atom: &Atom) -> Option<AtomRecord> {
        self.atoms.write().remove_entry(atom).map(|(atom, e)| AtomRecord {
            atom,
            kind: e.kind,
            value: e.value,
        })
    }

    pub fn len(&self) -> usize {
        self.atoms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.read().is_empty()
    }

    /// Point-in-time copy of every atom, for later comparison.
    pub fn image(&self) -> StoreImage {
        let atoms = self.atoms.read();
        StoreImage {
            atoms: atoms
                .iter()
                .map(|(a, e)| (a.clone(), (e.kind, e.value)))
                .collect(),
        }
    }
}

fn check_range(atom: &Atom, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(StoreError::ValueOutOfRange {
            atom: atom.to_string(),
            value,
        });
    }
    Ok(())
}

impl AtomLookup for MemoryStore {
    fn lookup(&self, atom: &Atom) -> Option<AtomRecord> {
        let atoms = self.atoms.read();
        atoms.get_key_value(atom).map(|(a, e)| AtomRecord {
            atom: a.clone(),
            kind: e.kind,
            value: e.value,
        })
    }
}

impl AtomStore for MemoryStore {
    fn resolve(&self, predicate: &str, args: &[Argument]) -> Result<AtomRecord> {
        self.check_signature(predicate, args)?;
        let probe = Atom::new(predicate, args.to_vec());
        self.lookup(&probe)
            .ok_or_else(|| StoreError::UnknownAtom(probe.to_string()))
    }

    fn persist_value(&self, atom: &Atom, value: f64) -> Result<()> {
        let value = value.clamp(0.0, 1.0);
        let mut atoms = self.atoms.write();
        let entry = atoms
            .get_mut(atom)
            .ok_or_else(|| StoreError::UnknownAtom(atom.to_string()))?;
        if entry.kind == AtomKind::Observed {
            return Err(StoreError::ObservedAtom(atom.to_string()));
        }
        entry.value = value;
        Ok(())
    }

    fn random_variables(&self) -> Vec<Atom> {
        let atoms = self.atoms.read();
        let mut out: Vec<Atom> = atoms
            .iter()
            .filter(|(_, e)| e.kind == AtomKind::RandomVariable)
            .map(|(a, _)| a.clone())
            .collect();
        out.sort();
        out
    }
}

/// A point-in-time copy of a store's atoms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreImage {
    pub atoms: BTreeMap<Atom, (AtomKind, f64)>,
}
