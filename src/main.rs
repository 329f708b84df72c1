use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use steward::actions::HandlerRegistry;
use steward::cli::{Cli, run_interactive};
use steward::config::StewardConfig;
use steward::error::Result;
use steward::executor::PlanExecutor;
use steward::plan::ActionRegistry;
use steward::planner::Planner;
use steward::supervisor::Supervisor;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("steward=debug")
    } else {
        EnvFilter::new("steward=info")
    };

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).without_time())
                .with(filter)
                .init();
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = StewardConfig::load(Path::new(".")).await?;

    // CLI flags override file-level configuration.
    config.planner.backend = cli.llm.clone();
    if let Some(model) = &cli.model_name {
        config.planner.model = model.clone();
    }
    if let Some(host) = &cli.ollama_host {
        config.planner.ollama_host = host.clone();
    }
    if let Some(catalog) = &cli.actions {
        config.paths.catalog = catalog.clone();
    }

    let registry = Arc::new(ActionRegistry::load(&config.paths.catalog).await?);
    let llm = steward::llm::build_client(&config.planner)?;
    let planner = Arc::new(Planner::new(
        Arc::clone(&registry),
        Arc::clone(&llm),
        &config.planner,
    ));
    let handlers = Arc::new(HandlerRegistry::new(
        Arc::clone(&registry),
        llm,
        config.foreach.concurrency,
    ));
    let executor = PlanExecutor::new(
        Arc::clone(&registry),
        handlers,
        config.executor.stage_concurrency,
    );

    let (supervisor, channels) = Supervisor::new(config.clone(), executor, Arc::clone(&planner));
    let worker = supervisor.start();

    let outcome = run_interactive(supervisor, channels, planner, registry, &config).await;

    worker.abort();
    outcome
}
