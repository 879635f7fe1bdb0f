//! Store comparison: which atoms changed between two images of the fact base.
//!
//! The usual source of seed atoms for an online round is "whatever evidence
//! changed since the last round"; [`StoreDiff::seed_refs`] produces exactly
//! that set.

use crate::atom::{Atom, AtomRef};
use crate::store::StoreImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDiff {
    /// Present in both images with a different value or kind.
    pub updated: Vec<Atom>,
    /// Only in the later image.
    pub added: Vec<Atom>,
    /// Only in the earlier image.
    pub removed: Vec<Atom>,
}

impl StoreDiff {
    pub fn between(before: &StoreImage, after: &StoreImage) -> Self {
        let mut diff = StoreDiff::default();
        for (atom, (kind, value)) in &after.atoms {
            match before.atoms.get(atom) {
                Some((old_kind, old_value)) => {
                    if old_kind != kind || old_value != value {
                        diff.updated.push(atom.clone());
                    }
                }
                None => diff.added.push(atom.clone()),
            }
        }
        diff.removed = before
            .atoms
            .keys()
            .filter(|a| !after.atoms.contains_key(*a))
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Updated and added atoms as round seeds, in atom order.
    pub fn seed_refs(&self) -> Vec<AtomRef> {
        let mut atoms: Vec<&Atom> = self.updated.iter().chain(self.added.iter()).collect();
        atoms.sort();
        atoms.into_iter().map(Atom::to_ref).collect()
    }
}
