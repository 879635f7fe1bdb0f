//! Hinge ADMM: a consensus ADMM solver for hinge-loss objectives with hard
//! linear constraints.
//!
//! Every ground kernel becomes one term holding local copies of the random
//! variables it touches. Observed atoms are folded into the term constant.
//! Terms are minimized in parallel and then averaged into the consensus
//! vector `z`, one writer per entry.
//!
//! A reasoner is single-use: build it from an [`AdmmReasonerFactory`], add
//! kernels, [`optimize`](ConsensusSolver::optimize), read the result through
//! [`ConsensusView`], then drop it.

pub mod config;
pub mod error;
pub mod reasoner;
pub mod term;
pub mod view;

pub use config::AdmmConfig;
pub use error::{Result, SolverError};
pub use reasoner::{AdmmReasoner, AdmmReasonerFactory, ConsensusSolver, SolveOutcome, SolverFactory};
pub use term::{AdmmTerm, TermKind};
pub use view::{ConsensusView, TermId, VariableLocation};
