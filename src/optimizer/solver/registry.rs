//! Process-wide solver executable registry.
//!
//! Paths registered here take precedence over `PATH` lookup. Registration is
//! idempotent and safe to call from any thread, any number of times.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use strum::IntoEnumIterator;

use super::error::{SolverError, SolverResult};
use super::SolverId;

static SOLVER_PATHS: Lazy<RwLock<HashMap<SolverId, PathBuf>>> = Lazy::new(Default::default);

/// Register `path` as the executable for `solver`.
///
/// Returns `false` when the same path was already registered.
pub fn register_solver_path(solver: SolverId, path: impl AsRef<Path>) -> bool {
    let path = path.as_ref().to_path_buf();
    {
        let paths = SOLVER_PATHS.read();
        if paths.get(&solver) == Some(&path) {
            return false;
        }
    }

    let mut paths = SOLVER_PATHS.write();
    match paths.insert(solver, path.clone()) {
        Some(previous) if previous == path => false,
        Some(previous) => {
            tracing::info!(%solver, previous = %previous.display(), path = %path.display(), "replaced solver path");
            true
        }
        None => {
            tracing::info!(%solver, path = %path.display(), "registered solver path");
            true
        }
    }
}

pub fn registered_path(solver: SolverId) -> Option<PathBuf> {
    SOLVER_PATHS.read().get(&solver).cloned()
}

/// Locate the executable for an external solver.
///
/// Search order:
/// 1. path registered in this process
/// 2. system `PATH`
pub fn resolve(solver: SolverId) -> SolverResult<PathBuf> {
    let binary_name = solver
        .binary_name()
        .ok_or_else(|| SolverError::UnknownSolver(format!("{solver} runs in-process and has no executable")))?;

    if let Some(path) = registered_path(solver) {
        if path.is_file() {
            return Ok(path);
        }
        return Err(SolverError::NotInstalled {
            solver,
            hint: format!("registered path {} does not exist", path.display()),
        });
    }

    which::which(binary_name).map_err(|_| SolverError::NotInstalled {
        solver,
        hint: format!("'{binary_name}' was not found on PATH"),
    })
}

/// Availability of every known solver, for diagnostics.
pub fn availability() -> Vec<(SolverId, SolverResult<Option<PathBuf>>)> {
    SolverId::iter()
        .map(|solver| {
            let located = match solver.binary_name() {
                Some(_) => resolve(solver).map(Some),
                None => Ok(None),
            };
            (solver, located)
        })
        .collect()
}
