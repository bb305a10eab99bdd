//! Error types and exit codes for solver invocations.

use std::fmt;
use std::process::ExitStatus;

use thiserror::Error;

use super::SolverId;

/// How an external solver process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Nonzero exit status
    Failure(i32),
    /// Ended without an exit status (killed by a signal)
    Terminated,
}

impl ExitCode {
    pub fn from_raw(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitCode::Success,
            Some(code) => ExitCode::Failure(code),
            None => ExitCode::Terminated,
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_raw(status.code())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Success => write!(f, "0"),
            ExitCode::Failure(code) => write!(f, "{code}"),
            ExitCode::Terminated => write!(f, "terminated by signal"),
        }
    }
}

/// Errors that can occur while running a solver.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Unknown solver: {0}")]
    UnknownSolver(String),

    #[error("Solver {solver} is not installed: {hint}")]
    NotInstalled { solver: SolverId, hint: String },

    #[error("Failed to start solver process: {0}")]
    ProcessStart(#[source] std::io::Error),

    /// The solver process ran but exited with a nonzero status.
    #[error("Solver process failed with exit code {exit_code}: {message}")]
    ProcessFailed { exit_code: ExitCode, message: String },

    #[error("Solver timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Malformed solver output: {0}")]
    MalformedSolution(String),

    /// Failure reported by an in-process backend.
    #[error("Solver backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;
