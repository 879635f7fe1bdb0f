//! Hinge Model: the ground vocabulary of incremental hinge-loss inference.
//!
//! ```text
//! ┌──────────────┐    resolve / persist    ┌──────────────────┐
//! │  AtomStore   │◄───────────────────────►│ round controller │
//! │ (MemoryStore)│                         └────────┬─────────┘
//! └──────────────┘                                  │ activate(atom)
//!                                                   ▼
//! ┌──────────────┐   kernels_touching     ┌──────────────────┐
//! │GroundProgram │◄───────────────────────│ ActivationEvents │──► solver
//! └──────────────┘                        └──────────────────┘
//! ```
//!
//! - [`Atom`]: structural identity of a ground atom.
//! - [`GroundKernel`]: a weighted hinge or a hard linear constraint over atoms.
//! - [`AtomStore`]: the fact base read at the start of a round and written at
//!   the end.
//! - [`StoreDiff`]: which atoms changed between two store images.
//! - [`GroundingSource`] / [`ActivationEvents`]: on-demand grounding of the
//!   kernels touching newly activated atoms.

pub mod atom;
pub mod diff;
pub mod grounding;
pub mod kernel;
pub mod model;
pub mod store;

pub use atom::{Argument, Atom, AtomKind, AtomRecord, AtomRef};
pub use diff::StoreDiff;
pub use grounding::{ActivationEvents, GroundProgram, GroundingSource};
pub use kernel::{
    infeasibility_norm, total_weighted_incompatibility, Comparator, GroundKernel, KernelKey,
    LinearForm, VALUE_CONSTRAINT_RULE,
};
pub use model::{AtomSpec, ModelError, ModelFile};
pub use store::{AtomLookup, AtomStore, MemoryStore, StoreError, StoreImage};
