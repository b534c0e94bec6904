use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tokio_util::sync::CancellationToken;

mod agent;
mod cli;
mod config;
mod platform;
mod snapshot;

use agent::{PollingScheduler, Publisher, SecretProvider, SyncLoop, TickOutcome, VaultProvider};
use cli::{Args, Commands};
use config::{AgentConfig, LoggingConfig};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .as_deref()
        .context("Config file path is required (use --config)")?;

    let config = AgentConfig::load(config_path).context("Error reading configuration file")?;

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_logging(args.verbose, &config.logging)?;
            run_agent(&config)
        }
        Commands::CheckNow => {
            init_logging(args.verbose, &config.logging)?;
            check_now(&config)
        }
        Commands::Validate => show_config(&config, config_path),
    }
}

/// Initialize logging
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
    };

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    Ok(())
}

fn build_sync_loop<P: SecretProvider>(config: &AgentConfig, provider: P) -> SyncLoop<P> {
    let publisher = Publisher::new(config.agent.export_env, Some(config.agent.file_mode));
    let scheduler = PollingScheduler::new(
        config.agent.poll_interval,
        config.agent.retry_interval,
        config.agent.poll_jitter,
    );

    SyncLoop::new(
        provider,
        publisher,
        scheduler,
        config.vault.secret_path.clone(),
        config.output_file.clone(),
    )
}

/// Single-threaded runtime: the publisher mutates the process environment,
/// so no other worker thread may be running while it does.
fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Run the sync loop until SIGINT or SIGTERM
fn run_agent(config: &AgentConfig) -> Result<()> {
    // Held until this function returns, on every exit path
    let _lock = platform::lock::acquire_or_bail(&config.agent.lock_file)?;

    let provider = VaultProvider::new(&config.vault).context("Unable to initialize Vault client")?;
    let mut sync = build_sync_loop(config, provider);

    tracing::info!("Starting vault-monitor {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Vault address: {}", config.vault.address);
    tracing::info!(
        "Poll interval: {} seconds (retry after {} seconds, +{} seconds jitter)",
        config.agent.poll_interval,
        config.agent.retry_interval,
        config.agent.poll_jitter
    );

    let runtime = build_runtime()?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let listener = agent::listen_for_shutdown(cancel.clone());

        sync.run(&cancel).await;

        cancel.cancel();
        if let Err(e) = listener.await {
            tracing::warn!("Shutdown listener ended abnormally: {}", e);
        }
    });

    Ok(())
}

/// Fetch and publish once
fn check_now(config: &AgentConfig) -> Result<()> {
    let _lock = platform::lock::acquire_or_bail(&config.agent.lock_file)?;

    let provider = VaultProvider::new(&config.vault).context("Unable to initialize Vault client")?;
    let mut sync = build_sync_loop(config, provider);

    println!("Checking for secret updates...");

    let runtime = build_runtime()?;
    let outcome = runtime.block_on(sync.check_once())?;

    let version = sync.state().last_known_version().unwrap_or_default();
    match outcome {
        TickOutcome::Published => {
            println!("✓ Secret published to {} (version: {})", config.output_file.display(), version);
        }
        _ => println!("✓ Secret unchanged"),
    }

    Ok(())
}

/// Print the effective configuration, without the token
fn show_config(config: &AgentConfig, path: &Path) -> Result<()> {
    println!("Vault Monitor Configuration");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Config file:    {}", path.display());
    println!("Vault address:  {}", config.vault.address);
    if let Some(namespace) = &config.vault.namespace {
        println!("Namespace:      {}", namespace);
    }
    println!("Secret path:    {}", config.vault.secret_path);
    println!("Output file:    {}", config.output_file.display());
    println!("Lock file:      {}", config.agent.lock_file.display());
    println!("Poll interval:  {} seconds", config.agent.poll_interval);
    println!("Retry interval: {} seconds", config.agent.retry_interval);
    println!("Export env:     {}", if config.agent.export_env { "yes" } else { "no" });
    println!("File mode:      {:o}", config.agent.file_mode);
    println!();
    println!("✓ Configuration is valid");

    Ok(())
}
