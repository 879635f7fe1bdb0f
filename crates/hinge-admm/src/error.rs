use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("kernel `{rule}` references {atom}, which the store does not know")]
    UnknownAtom { rule: String, atom: String },

    #[error("{0} is not a variable of this problem")]
    UnknownVariable(String),

    #[error("invalid bounds [{lower}, {upper}] for {atom}")]
    InvalidBounds { atom: String, lower: f64, upper: f64 },

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SolverError>;
