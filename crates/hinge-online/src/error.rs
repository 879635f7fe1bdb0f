use hinge_admm::SolverError;
use hinge_model::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OnlineError {
    /// A caller-supplied seed does not name a stored atom. Fatal to the round.
    #[error("cannot resolve seed atom {atom}: {source}")]
    SeedResolution { atom: String, source: StoreError },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OnlineError>;
