//! Round scripts for `hinge run`.
//!
//! ```json
//! {
//!   "rounds": [
//!     { "seeds": [ { "predicate": "Votes", "args": ["carol"] } ] },
//!     { "updates": [ { "predicate": "Anchor", "args": ["alice"], "value": 0.1 } ] }
//!   ]
//! }
//! ```
//!
//! A round without explicit `seeds` is seeded with every atom its `updates`
//! changed.

use anyhow::{Context, Result};
use hinge_model::{Argument, Atom, AtomRef, MemoryStore, StoreDiff};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueUpdate {
    pub predicate: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSpec {
    #[serde(default)]
    pub updates: Vec<ValueUpdate>,
    pub seeds: Option<Vec<AtomRef>>,
}

impl RoundSpec {
    /// Apply the value updates and return the seeds for this round.
    pub fn prepare(&self, store: &MemoryStore) -> Result<Vec<AtomRef>> {
        let before = store.image();
        for update in &self.updates {
            let atom = Atom::new(update.predicate.clone(), update.args.clone());
            store
                .update_value(&atom, update.value)
                .with_context(|| format!("updating {atom}"))?;
        }
        match &self.seeds {
            Some(seeds) => Ok(seeds.clone()),
            None => Ok(StoreDiff::between(&before, &store.image()).seed_refs()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundsFile {
    #[serde(default)]
    pub rounds: Vec<RoundSpec>,
}

impl RoundsFile {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading rounds file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing rounds file {}", path.display()))
    }
}
