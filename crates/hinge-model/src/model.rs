//! JSON model files: predicate signatures, atoms with their initial values,
//! and a pre-ground kernel program.
//!
//! ```json
//! {
//!   "predicates": { "Friends": 2, "Votes": 1 },
//!   "atoms": [
//!     { "predicate": "Friends", "args": ["a", "b"], "kind": "observed", "value": 1.0 },
//!     { "predicate": "Votes", "args": ["a"] }
//!   ],
//!   "kernels": [ ... ]
//! }
//! ```

use crate::atom::{Argument, Atom, AtomKind};
use crate::grounding::GroundProgram;
use crate::kernel::GroundKernel;
use crate::store::{MemoryStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid atom: {0}")]
    Store(#[from] StoreError),

    #[error("kernel `{rule}` references undeclared atom {atom}")]
    UndeclaredAtom { rule: String, atom: String },
}

fn default_kind() -> AtomKind {
    AtomKind::RandomVariable
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomSpec {
    pub predicate: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default = "default_kind")]
    pub kind: AtomKind,
    #[serde(default)]
    pub value: f64,
}

impl AtomSpec {
    pub fn atom(&self) -> Atom {
        Atom::new(self.predicate.clone(), self.args.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub predicates: BTreeMap<String, usize>,
    #[serde(default)]
    pub atoms: Vec<AtomSpec>,
    #[serde(default)]
    pub kernels: Vec<GroundKernel>,
}

impl ModelFile {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load the atoms into a fresh store.
    pub fn build_store(&self) -> Result<MemoryStore, ModelError> {
        let store = MemoryStore::new();
        for (name, arity) in &self.predicates {
            store.register_predicate(name.clone(), *arity);
        }
        for spec in &self.atoms {
            store.insert(spec.atom(), spec.kind, spec.value)?;
        }
        Ok(store)
    }

    /// Index the kernels, rejecting any that mention an atom missing from
    /// `atoms`.
    pub fn build_program(&self) -> Result<GroundProgram, ModelError> {
        let declared: ahash::AHashSet<Atom> = self.atoms.iter().map(AtomSpec::atom).collect();
        for kernel in &self.kernels {
            if let Some(missing) = kernel.atoms().find(|a| !declared.contains(*a)) {
                return Err(ModelError::UndeclaredAtom {
                    rule: kernel.rule().to_string(),
                    atom: missing.to_string(),
                });
            }
        }
        Ok(GroundProgram::from(self.kernels.clone()))
    }
}
