pub mod assembler;
pub mod batch;
pub mod builder;
pub mod milp;
pub mod solver;

pub use assembler::*;
pub use batch::*;
pub use builder::*;
pub use milp::*;
pub use solver::{SolveOptions, SolveStatus, SolverAdapter, SolverError, SolverId, SolverOutcome};
