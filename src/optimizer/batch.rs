//! Windowed optimisation of a full price horizon.
//!
//! The horizon `[start, end)` is cut into contiguous, equally sized windows
//! (the remainder joins the last one). Each window is built, solved and
//! assembled in order:
//!
//! `PENDING -> BUILDING -> SOLVING -> ASSEMBLED -> (next window | DONE)`
//!
//! The first failing window aborts the run. Results assembled so far are
//! dropped and the error names the plant and window.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use strum::Display;
use validator::Validate;

use super::assembler::ResultAssembler;
use super::builder::{DispatchModelBuilder, PreviousPeriodState};
use super::solver::{SolveStatus, SolverAdapter, SolverError};
use crate::domain::{DispatchResult, MarketPrices, PlantProfile};
use crate::error::{DispatchError, Result};

/// Shortest window the ramping model is solved over.
pub const MIN_WINDOW_PERIODS: usize = 12;

/// Half-open range of period positions `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowState {
    Pending,
    Building,
    Solving,
    Assembled,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BatchOptions {
    /// First period, defaults to 0
    pub start: Option<usize>,
    /// Exclusive last period, defaults to the series length
    pub end: Option<usize>,
    /// Defaults to a single window over the whole range
    #[validate(range(min = 1))]
    pub number_of_batches: Option<usize>,
    /// Accepted but not applied: windows are solved back to back.
    #[validate(range(min = 0.0, exclusive_max = 1.0))]
    pub overlap: f64,
    /// Link each window's first period to the last solved period of the previous one.
    pub carry_state: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            number_of_batches: None,
            overlap: 0.25,
            carry_state: false,
        }
    }
}

impl BatchOptions {
    /// Cut a horizon of `length` periods into windows.
    pub fn plan(&self, length: usize) -> Result<Vec<Window>> {
        self.validate()?;

        let start = self.start.unwrap_or(0);
        let end = match self.end {
            Some(end) if end >= length => {
                return Err(DispatchError::validation(format!(
                    "end {end} must be less than the series length {length}"
                )))
            }
            Some(end) => end,
            None => length,
        };
        if start >= end {
            return Err(DispatchError::validation(format!(
                "start {start} must be less than end {end}"
            )));
        }

        let batches = self.number_of_batches.unwrap_or(1);
        let size = (end - start) / batches;
        if size < MIN_WINDOW_PERIODS {
            return Err(DispatchError::validation(format!(
                "window size {size} ({} periods in {batches} batches) is below the minimum of {MIN_WINDOW_PERIODS}",
                end - start
            )));
        }

        Ok((0..batches)
            .map(|i| {
                let window_start = start + i * size;
                let window_end = if i + 1 == batches { end } else { window_start + size };
                Window::new(window_start, window_end)
            })
            .collect())
    }
}

pub struct BatchOptimizer {
    adapter: SolverAdapter,
}

impl BatchOptimizer {
    pub fn new(adapter: SolverAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &SolverAdapter {
        &self.adapter
    }

    pub async fn optimize(
        &self,
        profile: &PlantProfile,
        prices: &MarketPrices,
        options: &BatchOptions,
    ) -> Result<DispatchResult> {
        let windows = options.plan(prices.len())?;
        if options.overlap > 0.0 {
            tracing::debug!(overlap = options.overlap, "window overlap is not applied");
        }
        tracing::info!(
            plant = profile.id(),
            windows = windows.len(),
            periods = prices.len(),
            solver = %self.adapter.solver_id(),
            carry_state = options.carry_state,
            "starting batch optimisation"
        );

        let mut results = Vec::with_capacity(windows.len());
        let mut previous = None;
        for window in windows {
            let result = match self.solve_window(profile, prices, window, previous).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(plant = profile.id(), %window, error = %e, "window failed, aborting run");
                    return Err(e);
                }
            };
            if options.carry_state {
                previous = PreviousPeriodState::from_last_period(&result);
            }
            results.push(result);
        }

        let result = DispatchResult::concat(results)?;
        tracing::debug!(plant = profile.id(), state = %WindowState::Done, "window state");
        tracing::info!(
            plant = profile.id(),
            periods = result.len(),
            objective = result.objective(),
            "batch optimisation done"
        );
        Ok(result)
    }

    async fn solve_window(
        &self,
        profile: &PlantProfile,
        prices: &MarketPrices,
        window: Window,
        previous: Option<PreviousPeriodState>,
    ) -> Result<DispatchResult> {
        let plant = profile.id();
        let transition = |state: WindowState| {
            tracing::debug!(plant, %window, %state, "window state");
        };

        transition(WindowState::Pending);
        transition(WindowState::Building);
        let window_prices = prices.window(window.range())?;
        let model = DispatchModelBuilder::new(profile)
            .carry_previous_state(previous)
            .build(&window_prices)?;

        transition(WindowState::Solving);
        let outcome = self
            .adapter
            .solve(model.milp())
            .await
            .map_err(|source| match source {
                SolverError::Timeout { seconds } => DispatchError::SolverTimeout {
                    plant: plant.to_string(),
                    window,
                    seconds,
                },
                source => DispatchError::Solver {
                    plant: plant.to_string(),
                    window,
                    source,
                },
            })?;

        match outcome.status {
            SolveStatus::Optimal => {}
            SolveStatus::Feasible => {
                tracing::warn!(plant, %window, "solver stopped early, using best solution found");
            }
            SolveStatus::Infeasible => {
                return Err(DispatchError::InfeasibleModel {
                    plant: plant.to_string(),
                    window,
                })
            }
            SolveStatus::Unbounded => {
                return Err(DispatchError::Unbounded {
                    plant: plant.to_string(),
                    window,
                })
            }
            SolveStatus::TimedOut => {
                let limit = self.adapter.options().timeout.unwrap_or(outcome.elapsed);
                return Err(DispatchError::SolverTimeout {
                    plant: plant.to_string(),
                    window,
                    seconds: limit.as_secs(),
                });
            }
            SolveStatus::Error => {
                return Err(DispatchError::Solver {
                    plant: plant.to_string(),
                    window,
                    source: SolverError::Backend(format!("solver ended with status {}", outcome.status)),
                })
            }
        }

        let result = ResultAssembler::assemble(&model, &outcome)?;
        transition(WindowState::Assembled);
        tracing::info!(
            plant,
            %window,
            objective = result.objective(),
            solve_ms = outcome.elapsed.as_millis() as u64,
            "window solved"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Column, IndexValue, PlantConfig};
    use crate::optimizer::milp::MilpModel;
    use crate::optimizer::solver::{
        ExitCode, MockMilpSolver, SolveOptions, SolverId, SolverOutcome,
    };
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    fn profile() -> PlantProfile {
        PlantProfile::new(PlantConfig::default()).unwrap()
    }

    fn prices(periods: usize) -> MarketPrices {
        MarketPrices::from_columns(None, vec![20.0; periods], vec![10.0; periods]).unwrap()
    }

    fn all_off(model: &MilpModel) -> SolverOutcome {
        SolverOutcome::new(
            SolveStatus::Optimal,
            vec![0.0; model.variable_count()],
            model,
            Duration::from_millis(5),
        )
    }

    fn optimizer(mut solver: MockMilpSolver) -> BatchOptimizer {
        solver.expect_id().return_const(SolverId::Cbc);
        BatchOptimizer::new(SolverAdapter::new(Arc::new(solver), SolveOptions::default()))
    }

    fn options(batches: Option<usize>) -> BatchOptions {
        BatchOptions {
            number_of_batches: batches,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(48, None, None, Some(2), vec![(0, 24), (24, 48)])]
    #[case(50, None, None, Some(4), vec![(0, 12), (12, 24), (24, 36), (36, 50)])]
    #[case(48, Some(0), Some(40), None, vec![(0, 40)])]
    #[case(48, Some(6), Some(42), Some(3), vec![(6, 18), (18, 30), (30, 42)])]
    fn test_plan_windows(
        #[case] length: usize,
        #[case] start: Option<usize>,
        #[case] end: Option<usize>,
        #[case] batches: Option<usize>,
        #[case] expected: Vec<(usize, usize)>,
    ) {
        let options = BatchOptions {
            start,
            end,
            number_of_batches: batches,
            ..Default::default()
        };
        let windows: Vec<_> = options
            .plan(length)
            .unwrap()
            .into_iter()
            .map(|w| (w.start, w.end))
            .collect();
        assert_eq!(windows, expected);
    }

    #[rstest]
    #[case::window_too_small(48, Some(0), Some(10), Some(2), 0.25)]
    #[case::end_at_length(48, None, Some(48), None, 0.25)]
    #[case::start_after_end(48, Some(30), Some(20), None, 0.25)]
    #[case::zero_batches(48, None, None, Some(0), 0.25)]
    #[case::full_overlap(48, None, None, None, 1.0)]
    #[case::negative_overlap(48, None, None, None, -0.1)]
    #[case::short_horizon(11, None, None, None, 0.0)]
    #[case::empty_horizon(0, None, None, None, 0.0)]
    fn test_plan_rejects(
        #[case] length: usize,
        #[case] start: Option<usize>,
        #[case] end: Option<usize>,
        #[case] batches: Option<usize>,
        #[case] overlap: f64,
    ) {
        let options = BatchOptions {
            start,
            end,
            number_of_batches: batches,
            overlap,
            carry_state: false,
        };
        assert!(matches!(options.plan(length), Err(DispatchError::Validation(_))));
    }

    #[tokio::test]
    async fn test_validation_happens_before_solving() {
        let mut solver = MockMilpSolver::new();
        solver.expect_solve().never();

        let err = optimizer(solver)
            .optimize(&profile(), &prices(10), &options(Some(2)))
            .await
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_windows_are_concatenated_in_order() {
        let mut solver = MockMilpSolver::new();
        solver
            .expect_solve()
            .times(2)
            .returning(|model, _| Ok(all_off(model)));

        let result = optimizer(solver)
            .optimize(&profile(), &prices(48), &options(Some(2)))
            .await
            .unwrap();

        assert_eq!(result.len(), 48);
        assert_eq!(result.keys()[24], IndexValue::Integer(24));
        assert_eq!(result.column(Column::PowerPrice), &[20.0; 48]);
        assert_eq!(result.objective(), 0.0);
    }

    #[tokio::test]
    async fn test_infeasible_window_aborts_run() {
        let mut solver = MockMilpSolver::new();
        let mut calls = 0;
        solver.expect_solve().times(2).returning(move |model, _| {
            calls += 1;
            if calls == 1 {
                Ok(all_off(model))
            } else {
                Ok(SolverOutcome::new(SolveStatus::Infeasible, vec![], model, Duration::ZERO))
            }
        });

        let err = optimizer(solver)
            .optimize(&profile(), &prices(72), &options(Some(3)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::InfeasibleModel { ref plant, window } if plant == "reference-plant" && window == Window::new(24, 48)
        ));
    }

    #[tokio::test]
    async fn test_solver_errors_carry_window() {
        let mut solver = MockMilpSolver::new();
        solver.expect_solve().times(1).returning(|_, _| {
            Err(SolverError::ProcessFailed {
                exit_code: ExitCode::Failure(1),
                message: "bad lp".into(),
            })
        });

        let err = optimizer(solver)
            .optimize(&profile(), &prices(24), &BatchOptions::default())
            .await
            .unwrap_err();
        match err {
            DispatchError::Solver { window, source, .. } => {
                assert_eq!(window, Window::new(0, 24));
                assert!(matches!(source, SolverError::ProcessFailed { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    #[case(Err(SolverError::Timeout { seconds: 7 }), 7)]
    #[case(Ok(SolveStatus::TimedOut), 0)]
    #[tokio::test]
    async fn test_timeouts_are_distinct(
        #[case] response: std::result::Result<SolveStatus, SolverError>,
        #[case] seconds: u64,
    ) {
        let mut solver = MockMilpSolver::new();
        let response = Mutex::new(Some(response));
        solver.expect_solve().times(1).returning(move |model, _| {
            match response.lock().take() {
                Some(Ok(status)) => Ok(SolverOutcome::new(status, vec![], model, Duration::ZERO)),
                Some(Err(e)) => Err(e),
                None => Err(SolverError::Backend("called twice".into())),
            }
        });

        let err = optimizer(solver)
            .optimize(&profile(), &prices(24), &BatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::SolverTimeout { seconds: s, .. } if s == seconds
        ));
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    #[tokio::test]
    async fn test_carry_state_links_windows(#[case] carry_state: bool) {
        let linked = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&linked);

        let mut solver = MockMilpSolver::new();
        solver.expect_solve().times(2).returning(move |model, _| {
            seen.lock().push(
                model
                    .constraints()
                    .iter()
                    .any(|c| c.name() == Some("ramp_up_RMP_0")),
            );
            Ok(all_off(model))
        });

        let options = BatchOptions {
            number_of_batches: Some(2),
            carry_state,
            ..Default::default()
        };
        optimizer(solver)
            .optimize(&profile(), &prices(24), &options)
            .await
            .unwrap();

        assert_eq!(*linked.lock(), vec![false, carry_state]);
    }
}
