use thiserror::Error;

use crate::optimizer::solver::SolverError;
use crate::optimizer::Window;

/// Errors surfaced by the dispatch core.
///
/// Nothing is retried internally. Solve-time variants carry the plant id and
/// the window bounds so a caller can tell which chunk of the horizon failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Model build error: {0}")]
    ModelBuild(String),

    #[error("Model for plant '{plant}' is infeasible in window {window}")]
    InfeasibleModel { plant: String, window: Window },

    #[error("Model for plant '{plant}' is unbounded in window {window}")]
    Unbounded { plant: String, window: Window },

    #[error("Solver timed out after {seconds}s for plant '{plant}' in window {window}")]
    SolverTimeout {
        plant: String,
        window: Window,
        seconds: u64,
    },

    #[error("Solver failed for plant '{plant}' in window {window}: {source}")]
    Solver {
        plant: String,
        window: Window,
        #[source]
        source: SolverError,
    },
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

impl DispatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn alignment(message: impl Into<String>) -> Self {
        Self::Alignment(message.into())
    }

    /// Whether this error was raised before any solver was invoked.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Alignment(_))
    }
}

impl From<validator::ValidationErrors> for DispatchError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DispatchError::Validation(errors.to_string())
    }
}
