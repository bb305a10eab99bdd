//! COIN-OR CBC run as a subprocess.
//!
//! The model is converted into an `lp-solvers` problem, written as a CPLEX LP
//! file into a scratch directory and CBC is spawned on it. The solution file
//! it leaves behind is read back with the `lp-solvers` CBC parser.
//!
//! Variables are written as `x{position}` so arbitrary model names never have
//! to satisfy the LP grammar.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use good_lp::{Expression, IntoAffineExpression};
use lp_solvers::lp_format::{Constraint as LpConstraint, LpObjective, LpProblem};
use lp_solvers::problem::{Problem, StrExpression, Variable as LpVariable};
use lp_solvers::solvers::{CbcSolver as CbcFormat, SolverWithSolutionParsing, Status};
use tokio::process::Command;
use tokio::time::timeout;

use super::error::{ExitCode, SolverError, SolverResult};
use super::{registry, MilpSolver, SolveOptions, SolveStatus, SolverId, SolverOutcome};
use crate::optimizer::milp::MilpModel;

const MODEL_FILE: &str = "model.lp";
const SOLUTION_FILE: &str = "solution.txt";

/// Extra time CBC gets past its own `sec` limit before the process is killed.
const KILL_GRACE: Duration = Duration::from_secs(2);

pub struct CbcSolver {
    binary_path: PathBuf,
}

impl CbcSolver {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Use the registered executable, falling back to `PATH`.
    pub fn locate() -> SolverResult<Self> {
        registry::resolve(SolverId::Cbc).map(Self::new)
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn arguments(&self, model: &Path, solution: &Path, options: &SolveOptions) -> Vec<String> {
        let mut args = vec![model.display().to_string()];
        if let Some(limit) = options.timeout {
            args.push("sec".into());
            args.push(limit.as_secs().max(1).to_string());
        }
        if let Some(threads) = options.threads {
            args.push("threads".into());
            args.push(threads.to_string());
        }
        args.push("solve".into());
        args.push("solu".into());
        args.push(solution.display().to_string());
        args
    }
}

#[async_trait]
impl MilpSolver for CbcSolver {
    fn id(&self) -> SolverId {
        SolverId::Cbc
    }

    async fn solve(&self, model: &MilpModel, options: &SolveOptions) -> SolverResult<SolverOutcome> {
        let started = Instant::now();
        let workdir = tempfile::Builder::new().prefix("thermal-dispatch-").tempdir()?;
        let model_path = workdir.path().join(MODEL_FILE);
        let solution_path = workdir.path().join(SOLUTION_FILE);

        let problem = lp_problem(model);
        tokio::fs::write(&model_path, problem.display_lp().to_string()).await?;

        let args = self.arguments(&model_path, &solution_path, options);
        tracing::debug!(binary = %self.binary_path.display(), ?args, "spawning cbc");

        let child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SolverError::ProcessStart)?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match options.timeout {
            Some(limit) => match timeout(limit + KILL_GRACE, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    tracing::warn!(seconds = limit.as_secs(), "cbc exceeded its time limit, killed");
                    return Err(SolverError::Timeout {
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let exit_code = ExitCode::from_status(output.status);
        tracing::debug!(%exit_code, elapsed_ms = started.elapsed().as_millis() as u64, "cbc exited");
        if !exit_code.is_success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                tail(&String::from_utf8_lossy(&output.stdout), 5)
            } else {
                tail(&stderr, 5)
            };
            return Err(SolverError::ProcessFailed { exit_code, message });
        }

        let (status, values) = read_solution(&solution_path, &problem).await?;

        if options.keep_model_files {
            let kept = workdir.keep();
            tracing::info!(path = %kept.display(), "kept cbc model files");
        }

        Ok(SolverOutcome::new(status, values, model, started.elapsed()))
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn lp_expression(model: &MilpModel, expression: &Expression) -> StrExpression {
    let mut terms: Vec<(usize, f64)> = expression
        .linear_coefficients()
        .into_iter()
        .filter(|(_, coefficient)| *coefficient != 0.0)
        .filter_map(|(variable, coefficient)| Some((model.position(variable)?, coefficient)))
        .collect();
    terms.sort_by_key(|(position, _)| *position);
    StrExpression(
        terms
            .iter()
            .map(|(position, coefficient)| format!("{coefficient:+} x{position}"))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Convert a model into the `lp-solvers` representation CBC is fed from.
pub fn lp_problem(model: &MilpModel) -> Problem {
    let variables = model
        .variables()
        .enumerate()
        .map(|(position, (_, def))| LpVariable {
            name: format!("x{position}"),
            is_integer: def.is_integer(),
            lower_bound: def.get_min(),
            upper_bound: def.get_max(),
        })
        .collect();

    let constraints = model
        .constraints()
        .iter()
        .map(|c| LpConstraint {
            lhs: lp_expression(model, c.expression()),
            operator: if c.is_equality() {
                Ordering::Equal
            } else {
                Ordering::Less
            },
            // Adding zero turns -0 into 0 in the written file.
            rhs: -c.expression().constant() + 0.0,
        })
        .collect();

    Problem {
        name: model.name().to_string(),
        sense: LpObjective::Maximize,
        objective: lp_expression(model, model.objective()),
        variables,
        constraints,
    }
}

/// Map the parsed CBC status onto ours.
///
/// CBC's header says whether an early stop still carries an integer solution,
/// which the parsed status does not distinguish.
fn solve_status(status: &Status, header: &str) -> SolveStatus {
    let header = header.trim().to_ascii_lowercase();
    if header.starts_with("stopped") {
        return match (header.contains("no integer solution"), header.starts_with("stopped on time")) {
            (false, _) => SolveStatus::Feasible,
            (true, true) => SolveStatus::TimedOut,
            (true, false) => SolveStatus::Error,
        };
    }
    match status {
        Status::Optimal => SolveStatus::Optimal,
        Status::Infeasible => SolveStatus::Infeasible,
        Status::Unbounded => SolveStatus::Unbounded,
        _ => SolveStatus::Error,
    }
}

/// Read a CBC solution file written for `problem`. Variables CBC omits are zero.
pub async fn read_solution(path: &Path, problem: &Problem) -> SolverResult<(SolveStatus, Vec<f64>)> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SolverError::MalformedSolution(
                "cbc exited successfully but wrote no solution file".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let header = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| SolverError::MalformedSolution("empty solution file".into()))?;

    let parsed = CbcFormat::new()
        .read_solution_from_path(path, Some(problem))
        .map_err(SolverError::MalformedSolution)?;
    let status = solve_status(&parsed.status, header);
    if !status.has_solution() {
        return Ok((status, Vec::new()));
    }

    let values = problem
        .variables
        .iter()
        .map(|v| parsed.results.get(&v.name).map_or(0.0, |value| f64::from(*value)))
        .collect();
    Ok((status, values))
}
