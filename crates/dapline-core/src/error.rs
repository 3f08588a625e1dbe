//! Error types for dapline core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A `${...}` reference in launch parameters could not be resolved
    #[error("Variable substitution failed: {0}")]
    Substitution(String),

    /// Launch parameters are not a JSON object or could not be parsed
    #[error("Invalid launch parameters: {0}")]
    InvalidParameters(String),

    /// A `file:line` breakpoint location could not be parsed
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidParameters(err.to_string())
    }
}
