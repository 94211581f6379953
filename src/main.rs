//! ffmr-bootstrap - Main entry point
//!
//! With no arguments: provision the environment, install requirements.txt,
//! run `export.py setup_db`, and exit with the status of the last step.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ffmr_bootstrap::cli::{Cli, Commands, InsertDataArgs};
use ffmr_bootstrap::{
    Bootstrap, BootstrapConfig, BootstrapOutcome, DryRunRunner, SystemRunner, export,
    process_guard, sanity,
};

/// Initialize logging; `RUST_LOG` overrides the default level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let code = match &cli.command {
        None | Some(Commands::Run) => run_bootstrap(&cli)?,
        Some(Commands::Check) => run_check(&cli)?,
        Some(Commands::Validate { config }) => run_validate(config)?,
        Some(Commands::InitConfig { path }) => run_init_config(path)?,
        Some(Commands::InsertData(args)) => run_insert_data(args, cli.dry_run)?,
    };

    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<BootstrapConfig> {
    let config = BootstrapConfig::load_or_default(cli.config.as_deref())?.with_strict(cli.strict);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_bootstrap(cli: &Cli) -> Result<i32> {
    let config = load_config(cli)?;
    if !cli.workdir.is_dir() {
        anyhow::bail!("Working directory {:?} does not exist", cli.workdir);
    }
    let workdir = std::path::absolute(&cli.workdir)
        .with_context(|| format!("Failed to resolve working directory {:?}", cli.workdir))?;
    info!(
        "Bootstrapping in {:?} (provisioner={}, policy={})",
        workdir, config.provisioner, config.failure_policy
    );

    let outcome = if cli.dry_run {
        Bootstrap::new(config, &workdir, DryRunRunner::new()).run()?
    } else {
        Bootstrap::new(config, &workdir, SystemRunner::new(&workdir)).run()?
    };

    match (&outcome, outcome.diagnostic()) {
        (BootstrapOutcome::ProvisionFailed { .. }, Some(message)) => println!("{}", message),
        (_, Some(message)) => eprintln!("{}", message),
        (_, None) => {}
    }

    info!("Bootstrap finished with exit code {}", outcome.exit_code());
    Ok(outcome.exit_code())
}

fn run_check(cli: &Cli) -> Result<i32> {
    let config = load_config(cli)?;
    let result = sanity::verify_environment(&config, &cli.workdir);
    println!("{}", sanity::render_report(&result));
    Ok(if result.is_ok() { 0 } else { 1 })
}

fn run_validate(path: &Path) -> Result<i32> {
    info!("Validating configuration file: {:?}", path);
    let config = BootstrapConfig::load_from_file(path)?;
    match config.validate() {
        Ok(()) => {
            println!("✓ Configuration file is valid: {}", path.display());
            Ok(0)
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed: {}", e);
            Ok(1)
        }
    }
}

fn run_init_config(path: &Path) -> Result<i32> {
    if path.exists() {
        anyhow::bail!("{:?} already exists, not overwriting", path);
    }
    BootstrapConfig::default().save_to_file(path)?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(0)
}

fn run_insert_data(args: &InsertDataArgs, dry_run: bool) -> Result<i32> {
    let summary = export::insert_data(args.influx_config(), &args.nodes_url, dry_run)?;
    eprintln!(
        "✓ {} node(s) exported, {} point(s), {} gateway(s) skipped, {} invalid node(s), {} value(s) skipped",
        summary.nodes_exported,
        summary.points_written,
        summary.gateways_skipped,
        summary.nodes_invalid,
        summary.values_skipped
    );
    Ok(0)
}
