use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tandem::api::{self, AppState};
use tandem::client::ApiClientManager;
use tandem::components::ComponentDependencies;
use tandem::definitions::{ExecutionProfile, ProfileExpressionEvaluator};
use tandem::engine::{prepare_profile, ExecutorConfig, ProfileExecutor, ProfileOptions, ProfileTiming, RuntimeContext};
use tandem::errors::StatusCodeRegistry;
use tandem::factory::{ComponentFactory, FactoryConfig};
use tandem::lifecycle::LogMetricSink;
use tandem::storage::{FileStateStore, InMemoryStateStore, StateStore};
use tandem::{Config, EnvironmentLayout, ParameterMap, Scalar};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Distributed benchmark orchestration runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one or more execution profiles
    Run(RunArgs),
    /// Host the coordination API only
    Serve {
        #[arg(long, help = "Port for the coordination API")]
        api_port: Option<u16>,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long = "profile", required = true, help = "Profile file (JSON or YAML); repeat to merge")]
    profiles: Vec<PathBuf>,
    #[arg(long, help = "Stop the profile after this many seconds")]
    timeout_secs: Option<u64>,
    #[arg(long, help = "Run this many rounds of actions")]
    iterations: Option<u64>,
    #[arg(long, value_delimiter = ',', help = "Scenarios to include, or exclude with a '-' prefix")]
    scenarios: Vec<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    fail_fast: bool,
    #[arg(long, help = "Environment layout file (JSON)")]
    layout: Option<PathBuf>,
    #[arg(long, help = "Parameter overrides in the form key=value;key=value")]
    parameters: Option<String>,
    #[arg(long)]
    api_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let outcome = match cli.command {
        Commands::Run(args) => {
            apply_run_args(&mut config, &args);
            run_profiles(config, args).await
        }
        Commands::Serve { api_port } => {
            if let Some(port) = api_port {
                config.api_port = port;
            }
            serve_only(config).await
        }
    };

    if let Err(e) = outcome {
        log::error!("{:#}", e);
        std::process::exit(StatusCodeRegistry::exit_code(&e));
    }
    Ok(())
}

fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if let Some(port) = args.api_port {
        config.api_port = port;
    }
    if let Some(layout) = &args.layout {
        config.layout_path = Some(layout.clone());
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.fail_fast |= args.fail_fast;
}

async fn run_profiles(config: Config, args: RunArgs) -> Result<()> {
    let runtime = Arc::new(build_runtime(&config)?);
    let shutdown = runtime.cancellation().clone();
    watch_for_interrupt(shutdown.clone());
    let server = start_server(&config, runtime.clone(), shutdown.child_token()).await?;

    let profile = load_profiles(&args.profiles)?;

    let options = ProfileOptions {
        parameters: match &args.parameters {
            Some(text) => parse_parameters(text)?,
            None => ParameterMap::new(),
        },
        scenarios: args.scenarios.clone(),
    };
    let evaluator = Arc::new(ProfileExpressionEvaluator::default());
    let profile = prepare_profile(profile, &options, evaluator.as_ref())?;

    let dependencies = ComponentDependencies::new(
        runtime.clone(),
        Arc::new(ApiClientManager::new(config.api_port)),
    )
    .with_evaluator(evaluator)
    .with_metrics(Arc::new(LogMetricSink));

    let factory = ComponentFactory::new(
        dependencies,
        FactoryConfig {
            fail_fast: config.fail_fast,
            log_to_file: config.log_to_file,
            seed: config.seed,
        },
    );
    let components = factory.create_profile_components(&profile)?;

    log::info!(
        "Executing profile '{}' (agent={}, experiment={})",
        profile.description,
        runtime.agent_id(),
        runtime.experiment_id()
    );

    let executor = ProfileExecutor::new(
        &profile,
        components,
        runtime.clone(),
        ExecutorConfig {
            fail_fast: config.fail_fast,
            exit_wait: config.exit_wait,
        },
    );
    let timing = ProfileTiming::from_options(args.timeout_secs.map(Duration::from_secs), args.iterations);
    let outcome = executor.execute(timing, &shutdown).await;

    let exited = runtime.run_exit_tasks();
    if exited > 0 {
        log::debug!("Ran {} exit tasks", exited);
    }
    shutdown.cancel();
    if let Err(e) = server.await? {
        log::warn!("Coordination API stopped with an error: {}", e);
    }

    let summary = outcome?;
    log::info!(
        "Profile completed: {} iterations, {} failed actions",
        summary.iterations,
        summary.failed_actions
    );
    Ok(())
}

async fn serve_only(config: Config) -> Result<()> {
    let runtime = Arc::new(build_runtime(&config)?);
    let shutdown = runtime.cancellation().clone();
    watch_for_interrupt(shutdown.clone());

    let server = start_server(&config, runtime.clone(), shutdown.clone()).await?;
    runtime.set_online(true);
    server.await?
}

/// Loads each profile and merges the rest into the first.
fn load_profiles(paths: &[PathBuf]) -> Result<ExecutionProfile> {
    let mut merged: Option<ExecutionProfile> = None;
    for path in paths {
        let profile = ExecutionProfile::load(path)?;
        match merged.as_mut() {
            Some(existing) => existing.merge(profile),
            None => merged = Some(profile),
        }
    }
    merged.context("At least one profile is required.")
}

fn build_runtime(config: &Config) -> Result<RuntimeContext> {
    let runtime = RuntimeContext::new(config.agent_id.clone(), config.experiment_id);
    match &config.layout_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read environment layout '{}'", path.display()))?;
            Ok(runtime.with_layout(EnvironmentLayout::from_json(&json)?))
        }
        None => Ok(runtime),
    }
}

async fn start_server(
    config: &Config,
    runtime: Arc<RuntimeContext>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<Result<()>>> {
    let store: Arc<dyn StateStore> = match &config.state_dir {
        Some(dir) => Arc::new(FileStateStore::open(dir.clone()).await?),
        None => Arc::new(InMemoryStateStore::new()),
    };
    let state = AppState { store, runtime };
    let port = config.api_port;
    Ok(tokio::spawn(async move { api::serve(state, port, shutdown).await }))
}

fn watch_for_interrupt(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, cancelling");
            shutdown.cancel();
        }
    });
}

/// Parses `key=value;key=value` overrides, typing each value as a scalar.
fn parse_parameters(text: &str) -> Result<ParameterMap> {
    let mut parameters = ParameterMap::new();
    for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid parameter '{}'. Expected key=value.", pair))?;
        parameters.insert(key.trim(), Scalar::from_text(value.trim()));
    }
    Ok(parameters)
}
