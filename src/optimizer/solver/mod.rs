//! Solver boundary.
//!
//! [`MilpSolver`] is the seam between a built [`MilpModel`] and whatever
//! actually solves it. [`SolverAdapter`] picks a backend from configuration,
//! owns the solve options and performs the process-wide executable
//! registration before first use.

pub mod cbc;
pub mod error;
#[cfg(feature = "optimization")]
pub mod in_process;
pub mod registry;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub use cbc::CbcSolver;
pub use error::{ExitCode, SolverError, SolverResult};
#[cfg(feature = "optimization")]
pub use in_process::MicrolpSolver;

use super::milp::MilpModel;
use crate::config::SolverConfig;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SolverId {
    /// COIN-OR CBC executable
    Cbc,
    /// In-process `good_lp` microlp solver
    Microlp,
}

impl SolverId {
    /// Name of the executable, for solvers run as a subprocess.
    pub fn binary_name(&self) -> Option<&'static str> {
        match self {
            SolverId::Cbc => Some("cbc"),
            SolverId::Microlp => None,
        }
    }

    pub fn parse(name: &str) -> SolverResult<Self> {
        Self::from_str(name.trim()).map_err(|_| SolverError::UnknownSolver(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    /// Best solution found before a limit was hit
    Feasible,
    Infeasible,
    Unbounded,
    /// Limit hit without any integer solution
    TimedOut,
    Error,
}

impl SolveStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub status: SolveStatus,
    /// One value per model variable, empty when there is no solution
    pub values: Vec<f64>,
    /// Objective recomputed from `values`
    pub objective: Option<f64>,
    pub elapsed: Duration,
}

impl SolverOutcome {
    pub fn new(status: SolveStatus, values: Vec<f64>, model: &MilpModel, elapsed: Duration) -> Self {
        let objective = (status.has_solution() && values.len() == model.variable_count())
            .then(|| model.evaluate_objective(&values));
        Self {
            status,
            values,
            objective,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveOptions {
    pub timeout: Option<Duration>,
    pub threads: Option<usize>,
    pub keep_model_files: bool,
}

impl From<&SolverConfig> for SolveOptions {
    fn from(config: &SolverConfig) -> Self {
        Self {
            timeout: (config.timeout_seconds > 0).then(|| Duration::from_secs(config.timeout_seconds)),
            threads: config.threads,
            keep_model_files: config.keep_model_files,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MilpSolver: Send + Sync {
    fn id(&self) -> SolverId;

    async fn solve(&self, model: &MilpModel, options: &SolveOptions) -> SolverResult<SolverOutcome>;
}

#[derive(Clone)]
pub struct SolverAdapter {
    solver: Arc<dyn MilpSolver>,
    options: SolveOptions,
}

impl std::fmt::Debug for SolverAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverAdapter")
            .field("solver", &self.solver.id())
            .field("options", &self.options)
            .finish()
    }
}

impl SolverAdapter {
    pub fn new(solver: Arc<dyn MilpSolver>, options: SolveOptions) -> Self {
        Self { solver, options }
    }

    /// Build the configured backend.
    ///
    /// A configured CBC path must exist and is registered process-wide. When
    /// CBC cannot be located the configured `fallback` is used if there is
    /// one; otherwise the lookup error is returned.
    pub fn from_config(config: &SolverConfig) -> SolverResult<Self> {
        let backend = SolverId::parse(&config.backend)?;
        let options = SolveOptions::from(config);

        let solver: Arc<dyn MilpSolver> = match backend {
            SolverId::Cbc => {
                let located = match &config.cbc_path {
                    Some(path) if !path.is_file() => {
                        return Err(SolverError::NotInstalled {
                            solver: SolverId::Cbc,
                            hint: format!("configured cbc_path {} does not exist", path.display()),
                        })
                    }
                    Some(path) => {
                        registry::register_solver_path(SolverId::Cbc, path);
                        CbcSolver::locate()
                    }
                    None => CbcSolver::locate(),
                };
                select_cbc(located, config.fallback)?
            }
            SolverId::Microlp => in_process_solver()?,
        };

        Ok(Self::new(solver, options))
    }

    pub fn solver_id(&self) -> SolverId {
        self.solver.id()
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    pub async fn solve(&self, model: &MilpModel) -> SolverResult<SolverOutcome> {
        let solver = self.solver.id();
        tracing::debug!(
            %solver,
            model = model.name(),
            variables = model.variable_count(),
            constraints = model.constraints().len(),
            "solving model"
        );

        match self.solver.solve(model, &self.options).await {
            Ok(outcome) => {
                tracing::debug!(
                    %solver,
                    status = %outcome.status,
                    objective = ?outcome.objective,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "solver finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(%solver, error = %e, "solver failed");
                Err(e)
            }
        }
    }
}

/// CBC if it was located, else the configured fallback.
fn select_cbc(
    located: SolverResult<CbcSolver>,
    fallback: Option<SolverId>,
) -> SolverResult<Arc<dyn MilpSolver>> {
    match (located, fallback) {
        (Ok(cbc), _) => {
            tracing::info!(path = %cbc.binary_path().display(), "using cbc solver");
            Ok(Arc::new(cbc))
        }
        (Err(cause), Some(SolverId::Microlp)) => {
            tracing::warn!(error = %cause, "cbc unavailable, using configured fallback microlp");
            in_process_solver()
        }
        (Err(cause), _) => Err(cause),
    }
}

#[cfg(feature = "optimization")]
fn in_process_solver() -> SolverResult<Arc<dyn MilpSolver>> {
    tracing::info!("using in-process microlp solver");
    Ok(Arc::new(MicrolpSolver::new()))
}

#[cfg(not(feature = "optimization"))]
fn in_process_solver() -> SolverResult<Arc<dyn MilpSolver>> {
    Err(SolverError::UnknownSolver(
        "microlp requires the 'optimization' feature".to_string(),
    ))
}
