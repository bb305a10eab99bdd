use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::optimizer::BatchOptions;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// Extra TOML configuration layered over `config/default.toml`.
    #[clap(long, global = true, env = "DISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Optimise the dispatch schedule of one plant against a price file.
    #[clap(name = "optimize")]
    Optimize(OptimizeArgs),

    /// Show which solvers can be used.
    #[clap(name = "solvers")]
    Solvers,
}

#[derive(Parser)]
pub struct OptimizeArgs {
    /// Plant configuration (TOML).
    #[clap(long)]
    pub plant: PathBuf,

    /// Wholesale and clean fuel prices (JSON).
    #[clap(long)]
    pub prices: PathBuf,

    /// First period to optimise.
    #[clap(long)]
    pub start: Option<usize>,

    /// Exclusive last period, must be below the number of prices.
    #[clap(long)]
    pub end: Option<usize>,

    /// Number of windows the horizon is split into.
    #[clap(long)]
    pub batches: Option<usize>,

    /// Carry the last period of each window into the next. `--carry-state=false`
    /// turns a configured carry-over off.
    #[clap(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub carry_state: Option<bool>,

    /// Write the result here instead of stdout.
    #[clap(long, short)]
    pub output: Option<PathBuf>,
}

impl OptimizeArgs {
    /// Command-line values take precedence over configured ones.
    pub fn batch_options(&self, configured: BatchOptions) -> BatchOptions {
        BatchOptions {
            start: self.start.or(configured.start),
            end: self.end.or(configured.end),
            number_of_batches: self.batches.or(configured.number_of_batches),
            carry_state: self.carry_state.unwrap_or(configured.carry_state),
            ..configured
        }
    }
}
