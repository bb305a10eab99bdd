//! Pure-Rust MILP backend on `good_lp` with the `microlp` solver.
//!
//! The solve runs on its own detached thread. A solve that outlives its time
//! limit is abandoned: the caller gets [`SolverError::Timeout`] right away and
//! neither the caller nor runtime shutdown waits for the thread. microlp is
//! handed the same limit so the abandoned thread stops on its own shortly
//! after.

use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use good_lp::{ResolutionError, Solution, SolutionStatus, SolverModel, WithTimeLimit};
use tokio::sync::oneshot;
use tokio::time::timeout;

use super::error::{SolverError, SolverResult};
use super::{MilpSolver, SolveOptions, SolveStatus, SolverId, SolverOutcome};
use crate::optimizer::milp::MilpModel;

/// Extra time past the limit before the caller stops waiting for microlp.
const ABANDON_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy)]
pub struct MicrolpSolver;

impl MicrolpSolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MilpSolver for MicrolpSolver {
    fn id(&self) -> SolverId {
        SolverId::Microlp
    }

    async fn solve(&self, model: &MilpModel, options: &SolveOptions) -> SolverResult<SolverOutcome> {
        let started = Instant::now();
        let owned = model.clone();
        let limit = options.timeout;
        let (status, values) = run_detached(move || solve_blocking(&owned, limit), limit.map(|l| l + ABANDON_GRACE))
            .await
            .map_err(|e| match e {
                SolverError::Timeout { .. } => SolverError::Timeout {
                    seconds: limit.map_or(0, |l| l.as_secs()),
                },
                e => e,
            })??;

        Ok(SolverOutcome::new(status, values, model, started.elapsed()))
    }
}

/// Run `job` on a detached thread and wait at most `limit` for its result.
///
/// On timeout the thread is left to finish by itself; its result is dropped
/// with the channel.
pub(crate) async fn run_detached<T, F>(job: F, limit: Option<Duration>) -> SolverResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    thread::Builder::new()
        .name("microlp-solve".into())
        .spawn(move || {
            let _ = sender.send(job());
        })?;

    let received = match limit {
        Some(limit) => timeout(limit, receiver).await.map_err(|_| {
            tracing::warn!(seconds = limit.as_secs(), "in-process solve exceeded its time limit, abandoned");
            SolverError::Timeout {
                seconds: limit.as_secs(),
            }
        })?,
        None => receiver.await,
    };
    received.map_err(|_| SolverError::Backend("solver thread exited without a result".into()))
}

fn solve_blocking(model: &MilpModel, limit: Option<Duration>) -> SolverResult<(SolveStatus, Vec<f64>)> {
    let mut problem = model
        .to_unsolved()
        .using(good_lp::microlp)
        .with_all(model.constraints().iter().cloned());
    if let Some(limit) = limit {
        problem = problem.with_time_limit(limit.as_secs_f64());
    }

    match problem.solve() {
        Ok(solution) => {
            let status = match solution.status() {
                SolutionStatus::Optimal => SolveStatus::Optimal,
                SolutionStatus::TimeLimit | SolutionStatus::GapLimit => SolveStatus::Feasible,
            };
            let values = model.variables().map(|(v, _)| solution.value(v)).collect();
            Ok((status, values))
        }
        Err(ResolutionError::Infeasible) => Ok((SolveStatus::Infeasible, Vec::new())),
        Err(ResolutionError::Unbounded) => Ok((SolveStatus::Unbounded, Vec::new())),
        // microlp reports a limit without any incumbent as a plain error
        Err(ResolutionError::Other(message)) if limit.is_some() && message.contains("Time limit") => {
            Ok((SolveStatus::TimedOut, Vec::new()))
        }
        Err(e) => Err(SolverError::Backend(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use good_lp::{constraint, variable};

    #[tokio::test]
    async fn test_solves_small_milp() {
        let mut model = MilpModel::new("small");
        let on = model.add_variable("on", variable().binary());
        let out = model.add_variable("out", variable().min(0));
        model.add_constraint("cap", constraint!(out <= 10.0 * on));
        model.add_constraint("fixed", constraint!(out <= 7.5));
        model.set_objective(2.0 * out - 1.0 * on);

        let outcome = MicrolpSolver.solve(&model, &SolveOptions::default()).await.unwrap();

        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!((outcome.values[model.position(out).unwrap()] - 7.5).abs() < 1e-6);
        assert!((outcome.values[model.position(on).unwrap()] - 1.0).abs() < 1e-6);
        assert!((outcome.objective.unwrap() - 14.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reports_infeasible() {
        let mut model = MilpModel::new("infeasible");
        let x = model.add_variable("x", variable().min(0));
        model.add_constraint("low", constraint!(x <= 1.0));
        model.add_constraint("high", constraint!(x >= 2.0));
        model.set_objective(x);

        let outcome = MicrolpSolver.solve(&model, &SolveOptions::default()).await.unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_empty());
        assert_eq!(outcome.objective, None);
    }

    #[tokio::test]
    async fn test_detached_job_result_is_returned() {
        let value = run_detached(|| 42, Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_runtime_shutdown_does_not_wait_for_abandoned_solve() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let started = Instant::now();

        let result = runtime.block_on(run_detached(
            || thread::sleep(Duration::from_secs(10)),
            Some(Duration::from_millis(100)),
        ));
        drop(runtime);

        assert!(matches!(result, Err(SolverError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }
}
