use anyhow::{Context, Result};
use clap::Parser;
use thermal_dispatch::{
    cli::{Args, Command},
    config::Config,
    input,
    optimizer::{solver::registry, BatchOptimizer, SolverAdapter, SolverId},
    telemetry::init_tracing,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let cfg = Config::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(cfg.logging.format)?;

    match args.command {
        Command::Optimize(optimize) => {
            let profile = input::load_plant(&optimize.plant)?;
            let prices = input::load_prices(&optimize.prices)?;
            let options = optimize.batch_options(cfg.batch.options());

            let adapter = SolverAdapter::from_config(&cfg.solver).context("initialising solver")?;
            let result = BatchOptimizer::new(adapter)
                .optimize(&profile, &prices, &options)
                .await?;

            let summary = result.summary();
            info!(
                plant = profile.id(),
                periods = summary.periods,
                objective = summary.objective,
                production_mwh = summary.production_mwh,
                committed_periods = summary.committed_periods,
                "dispatch optimised"
            );
            input::write_result(&result, optimize.output.as_deref())?;
        }
        Command::Solvers => {
            if let Some(path) = &cfg.solver.cbc_path {
                registry::register_solver_path(SolverId::Cbc, path);
            }
            for (solver, located) in registry::availability() {
                match located {
                    Ok(Some(path)) => println!("{solver}\t{}", path.display()),
                    Ok(None) => println!("{solver}\tin-process"),
                    Err(e) => println!("{solver}\tunavailable ({e})"),
                }
            }
        }
    }

    Ok(())
}
