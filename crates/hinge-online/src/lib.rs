//! Hinge Online: incremental inference over a changing fact store.
//!
//! After a full solve, each later round re-solves only a bounded region of
//! the problem:
//!
//! ```text
//!  seeds ──► Activator ◄── selection policy ◄── ActivationScorer
//!              │                                      ▲
//!              ▼                                      │
//!        on-demand grounding ──► solver ──► ReasonerSnapshot
//!              ▲                   ▲
//!              │                   │
//!        constraint partners    clamps for every inactive variable
//! ```
//!
//! - [`ReasonerSnapshot`]: what survives a solve: consensus values, duals
//!   and kernel adjacency.
//! - [`ActivationScorer`]: one priority per variable, from one of several
//!   strategies.
//! - [`selection`]: top-k, weighted sampling, or relational exploration up to
//!   an activation quota.
//! - [`OnlineInference`]: the round controller.

pub mod activation;
pub mod clamp;
pub mod config;
pub mod controller;
pub mod error;
pub mod scoring;
pub mod selection;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use activation::{ActivationSet, Activator};
pub use clamp::{plan_clamps, Clamp};
pub use config::{OnlineConfig, ScoringConfig, SelectionPolicy, StructureSource};
pub use controller::{OnlineInference, RoundPhase, RoundResult};
pub use error::{OnlineError, Result};
pub use scoring::{
    invert_scores, ActivationFeatures, ActivationScorer, Aggregation, ScoreMap, ScoringFallback,
    ScoringStrategy,
};
pub use selection::{
    activation_quota, rank_descending, sample_without_replacement, top_k, FrontierEntry,
    FrontierQueue, QuotaDecision, QuotaDiagnostic,
};
pub use snapshot::{ReasonerSnapshot, TermRecord, VariableState};
