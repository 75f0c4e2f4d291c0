pub mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::api::AppState;
use crate::clock::{Clock, SystemClock};
use crate::engine::types::{LaunchRequest, Run, RunStatus};
use crate::engine::{EngineConfig, RetryOutcome, RunAdvancer, request_retry};
use crate::runner::Runner;
use crate::storage::RunStore;
use crate::storage::json_store::JsonRunStore;

use config::SteplineConfig;

#[derive(Parser)]
#[command(name = "stepline", version, about = "Agent workflow run engine")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a run from a JSON launch request
    Launch {
        /// Path to a JSON launch request file
        file: PathBuf,

        /// State store directory
        #[arg(long, default_value = "data/runs")]
        store_dir: PathBuf,
    },

    /// List runs
    List {
        /// Filter by status (queued, running, succeeded, failed, canceled)
        #[arg(short, long)]
        status: Option<String>,

        /// State store directory
        #[arg(long, default_value = "data/runs")]
        store_dir: PathBuf,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Inspect a specific run
    Inspect {
        /// Run ID
        run_id: String,

        /// State store directory
        #[arg(long, default_value = "data/runs")]
        store_dir: PathBuf,
    },

    /// Request an immediate retry of a step, bypassing its backoff window
    Retry {
        /// Run ID
        run_id: String,

        /// Step index (defaults to the run's current cursor)
        #[arg(short, long)]
        step: Option<usize>,

        /// State store directory
        #[arg(long, default_value = "data/runs")]
        store_dir: PathBuf,
    },

    /// Advance every eligible run once (cron entry point)
    Tick {
        /// State store directory
        #[arg(long, default_value = "data/runs", env = "STORE_DIR")]
        store_dir: PathBuf,

        /// Config file path (default: auto-detect stepline.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List available agents
    Agents,

    /// Start the REST API server with an embedded polling runner
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000", env = "PORT")]
        port: u16,

        /// State store directory
        #[arg(long, default_value = "data/runs", env = "STORE_DIR")]
        store_dir: PathBuf,

        /// Config file path (default: auto-detect stepline.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Disable the embedded runner (serve the API only)
        #[arg(long)]
        no_runner: bool,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv(cli.dotenv.as_deref());

    match cli.command {
        Commands::Launch { file, store_dir } => cmd_launch(file, store_dir).await,
        Commands::List {
            status,
            store_dir,
            format,
        } => cmd_list(status, store_dir, format).await,
        Commands::Inspect { run_id, store_dir } => cmd_inspect(run_id, store_dir).await,
        Commands::Retry {
            run_id,
            step,
            store_dir,
        } => cmd_retry(run_id, step, store_dir).await,
        Commands::Tick { store_dir, config } => cmd_tick(store_dir, config).await,
        Commands::Agents => cmd_agents(),
        Commands::Serve {
            host,
            port,
            store_dir,
            config,
            no_runner,
        } => cmd_serve(host, port, store_dir, config, no_runner).await,
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory.
fn load_dotenv(explicit_path: Option<&std::path::Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {
                // No .env file found — silently skip
            }
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

fn engine_config(config: &SteplineConfig) -> EngineConfig {
    let defaults = EngineConfig::default();
    EngineConfig {
        lease_ms: config.lease_ms.unwrap_or(defaults.lease_ms),
        base_delay_ms: config.base_delay_ms.unwrap_or(defaults.base_delay_ms),
        max_delay_ms: config.max_delay_ms.unwrap_or(defaults.max_delay_ms),
        step_timeout_ms: config.step_timeout_ms.or(defaults.step_timeout_ms),
    }
}

fn runner_id(config: &SteplineConfig) -> String {
    config
        .runner_id
        .clone()
        .unwrap_or_else(|| format!("runner-{}", Uuid::new_v4()))
}

async fn cmd_launch(file: PathBuf, store_dir: PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read launch request: {}", file.display()))?;
    let req: LaunchRequest = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse launch request: {}", file.display()))?;

    if req.steps.is_empty() {
        anyhow::bail!("A run needs at least one step");
    }

    let clock = SystemClock;
    let run = Run::from_launch(req, clock.now());
    let store = JsonRunStore::new(store_dir);
    store.create_run(&run).await?;

    println!("Run ID: {}", run.id);
    println!("Status: {}", run.status);
    println!("Steps:  {}", run.steps.len());

    Ok(())
}

async fn cmd_list(status_filter: Option<String>, store_dir: PathBuf, format: String) -> Result<()> {
    let store = JsonRunStore::new(store_dir);

    let status: Option<RunStatus> = status_filter
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let runs = store.list_runs(status).await?;

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<10} {:>5}/{:<5} {:<24}",
        "RUN ID", "NAME", "STATUS", "STEP", "TOTAL", "CREATED"
    );
    println!("{}", "-".repeat(110));

    for run in &runs {
        println!(
            "{:<38} {:<24} {:<10} {:>5}/{:<5} {:<24}",
            run.id,
            run.name,
            run.status,
            run.next_step_index,
            run.steps.len(),
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    println!("\nTotal: {} run(s)", runs.len());
    Ok(())
}

async fn cmd_inspect(run_id: String, store_dir: PathBuf) -> Result<()> {
    let store = JsonRunStore::new(store_dir);

    let run = store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Run '{}' not found", run_id))?;

    println!("{}", serde_json::to_string_pretty(&run)?);

    Ok(())
}

async fn cmd_retry(run_id: String, step: Option<usize>, store_dir: PathBuf) -> Result<()> {
    let store = JsonRunStore::new(store_dir);
    let clock = SystemClock;

    match request_retry(&store, &clock, &run_id, step).await? {
        RetryOutcome::Requeued => {
            println!("Run {} requeued for immediate pickup", run_id);
            Ok(())
        }
        RetryOutcome::NotFound => anyhow::bail!("Run '{}' not found", run_id),
        RetryOutcome::InvalidStep { index } => {
            anyhow::bail!("Step index {} does not exist in run '{}'", index, run_id)
        }
    }
}

async fn cmd_tick(store_dir: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = SteplineConfig::load(config_path.as_deref())?;

    let registry = Arc::new(AgentRegistry::with_builtins());
    let store: Arc<dyn RunStore> = Arc::new(JsonRunStore::new(store_dir));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let advancer = Arc::new(RunAdvancer::new(
        registry,
        store.clone(),
        clock.clone(),
        runner_id(&config),
        engine_config(&config),
    ));

    let runner = Runner::new(
        advancer,
        store,
        clock,
        std::time::Duration::from_millis(config.poll_interval_ms.unwrap_or(1_000)),
        config.batch_size.unwrap_or(32),
        config.max_concurrent_runs.unwrap_or_else(num_cpus::get),
    );

    let progressed = runner.tick().await?;
    println!("Advanced {} run(s)", progressed);

    Ok(())
}

fn cmd_agents() -> Result<()> {
    let registry = AgentRegistry::with_builtins();
    let agents = registry.list();

    println!("{:<20} DESCRIPTION", "AGENT TYPE");
    println!("{}", "-".repeat(60));

    for (name, desc) in &agents {
        println!("{:<20} {}", name, desc);
    }

    println!("\nTotal: {} agent(s)", agents.len());
    Ok(())
}

async fn cmd_serve(
    host: String,
    port: u16,
    store_dir: PathBuf,
    config_path: Option<PathBuf>,
    no_runner: bool,
) -> Result<()> {
    let config = SteplineConfig::load(config_path.as_deref())?;

    let host = config.host.clone().unwrap_or(host);
    let port = config.port.unwrap_or(port);
    let store_dir = config
        .store_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or(store_dir);

    let registry = Arc::new(AgentRegistry::with_builtins());
    let store: Arc<dyn RunStore> = Arc::new(JsonRunStore::new(store_dir));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let advancer = Arc::new(RunAdvancer::new(
        registry.clone(),
        store.clone(),
        clock.clone(),
        runner_id(&config),
        engine_config(&config),
    ));

    if !no_runner {
        let runner = Runner::new(
            advancer.clone(),
            store.clone(),
            clock.clone(),
            std::time::Duration::from_millis(config.poll_interval_ms.unwrap_or(1_000)),
            config.batch_size.unwrap_or(32),
            config.max_concurrent_runs.unwrap_or_else(num_cpus::get),
        );
        tokio::spawn(async move {
            if let Err(e) = runner.run_forever().await {
                tracing::error!(error = %e, "runner exited");
            }
        });
    }

    let state = Arc::new(AppState {
        registry,
        store,
        advancer,
        clock,
    });

    crate::api::serve(&host, port, state).await
}
