//! Profit-maximising hourly dispatch for a single thermal power plant.
//!
//! A [`PlantProfile`](domain::PlantProfile) and aligned
//! [`MarketPrices`](domain::MarketPrices) go through
//! [`BatchOptimizer`](optimizer::BatchOptimizer), which builds one MILP per
//! window, solves it through a [`SolverAdapter`](optimizer::SolverAdapter) and
//! concatenates the windows into a [`DispatchResult`](domain::DispatchResult).

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod input;
pub mod optimizer;
pub mod telemetry;

pub use error::{DispatchError, Result};
