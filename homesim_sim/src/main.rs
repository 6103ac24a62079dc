//! Home simulator CLI
//!
//! `homesim serve` runs the live simulation behind the HTTP control surface.
//! `homesim scenario` runs the deterministic scenarios.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use homesim_core::{
    Catalog, ClimateConfig, EngineConfig, HomeController, HomeEngine, SharedRegistry,
};
use homesim_env::TokioContext;
use homesim_sim::{server, ScenarioId, ScenarioResult, ScenarioRunner};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "homesim")]
#[command(about = "Smart-home device and sensor simulator", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulation loop behind the HTTP control surface
    Serve(ServeArgs),

    /// Run deterministic scenarios
    Scenario(ScenarioArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind the HTTP server
    #[arg(long, default_value = "0.0.0.0:5555")]
    bind: SocketAddr,

    /// Milliseconds between ticks
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Ticks between climate resamples
    #[arg(long, default_value = "30")]
    resample_every: u32,

    /// Seed for climate drift (0 = OS entropy)
    #[arg(long, default_value = "0")]
    seed: u64,

    /// JSON catalog to load instead of the built-in home
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Scenario to run (heater_ramp, light_switch, idle_tv, drift_resample,
    /// concurrent_control, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: u64,

    /// Ticks for the long-running scenarios
    #[arg(long, default_value = "90")]
    ticks: u64,

    /// Virtual milliseconds per tick
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the per-tick trace of a single scenario to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Serve(args) => serve(args),
        Command::Scenario(args) => run_scenarios(args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

const LOG_TARGETS: &[&str] = &[
    "homesim",
    "homesim_core",
    "homesim_env",
    "homesim_sim",
    "tower_http",
];

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        EnvFilter::new(directives.join(","))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn serve(args: ServeArgs) -> anyhow::Result<ExitCode> {
    let catalog = match &args.catalog {
        Some(path) => Catalog::from_path(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::default_home(),
    };
    let config = EngineConfig {
        tick_interval: Duration::from_millis(args.tick_ms),
        climate: ClimateConfig {
            resample_every: args.resample_every,
            ..ClimateConfig::default()
        },
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(run_server(args, catalog, config))
}

async fn run_server(
    args: ServeArgs,
    catalog: Catalog,
    config: EngineConfig,
) -> anyhow::Result<ExitCode> {
    let context = if args.seed == 0 {
        TokioContext::shared()
    } else {
        Arc::new(TokioContext::seeded(args.seed))
    };
    let registry = SharedRegistry::from_catalog(catalog)?;
    info!(entities = registry.read(|r| r.len()), "Catalog loaded");

    let engine = HomeEngine::new(context, registry.clone(), config)?;
    let cancel = CancellationToken::new();
    let simulation = engine.spawn(cancel.clone());

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        on_signal.cancel();
    });

    let served = server::serve(listener, HomeController::new(registry), cancel.clone()).await;
    cancel.cancel();
    simulation.await.context("simulation loop panicked")?;
    served?;

    Ok(ExitCode::SUCCESS)
}

fn run_scenarios(args: ScenarioArgs) -> anyhow::Result<ExitCode> {
    let scenarios = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse::<ScenarioId>() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                bail!("{e} (available: {}, all)", names.join(", "))
            }
        }
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        bail!("--export only supports a single scenario and seed");
    }

    if !args.json {
        info!("Home simulator scenarios v{}", env!("CARGO_PKG_VERSION"));
    }

    let mut results: Vec<ScenarioResult> = Vec::new();
    for offset in 0..args.seeds.max(1) {
        let seed = args.seed.wrapping_add(offset);
        let runner = ScenarioRunner::new(seed)
            .with_ticks(args.ticks)
            .with_tick_interval(Duration::from_millis(args.tick_ms));

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            results.push(result);
        }
    }

    if let (Some(path), Some(result)) = (&args.export, results.first()) {
        result
            .to_export()
            .write_to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Exported {} frames to {}", result.frames.len(), path.display());
    }

    let total = results.len();
    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "sensors": r.final_sensors,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if failed == 0 {
        info!("All {} scenario runs passed", total);
    } else {
        error!("{}/{} scenario runs failed", failed, total);
    }

    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
