//! fleetd: runs a fleet described by a `fleet.toml` file.
//!
//! The fleet runs against the in-memory runtime from `fleet-sim`, so the
//! whole control loop can be watched without a container engine.
//!
//! # Usage
//!
//! ```text
//! fleetd check    --config demos/fleet.toml
//! fleetd simulate --config demos/fleet.toml --exec 'echo hello'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use fleet_controller::FleetController;
use fleet_core::{FleetConfig, RetryOptions, Runtime, try_until};
use fleet_scheduler::{ExecRequest, Target};
use fleet_sim::{SimConfig, SimRuntime};

const DEFAULT_FILTER: &str = "info,fleetd=debug,fleet=debug";

#[derive(Parser)]
#[command(name = "fleetd", about = "Fleet daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a fleet file and print the resolved fleet.
    Check {
        #[arg(long, default_value = "fleet.toml")]
        config: PathBuf,
    },

    /// Run the fleet against the in-memory runtime until Ctrl-C.
    Simulate {
        #[arg(long, default_value = "fleet.toml")]
        config: PathBuf,

        /// Shell command to run on the least-loaded worker once ready.
        #[arg(long)]
        exec: Option<String>,

        /// Milliseconds a simulated worker takes to start.
        #[arg(long, default_value = "0")]
        start_delay_ms: u64,

        /// Give simulated workers a health check.
        #[arg(long)]
        health_check: bool,
    },
}

#[derive(Serialize)]
struct ResolvedFleet<'a> {
    name: &'a str,
    target: u32,
    per_service: u32,
    services: Vec<&'a str>,
    poll_interval_ms: u64,
    ready_timeout_ms: u64,
    scaling: fleet_core::ScalingKind,
    threshold: Option<u32>,
    readiness: fleet_core::ReadinessKind,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Check { config } => check(config),
        Command::Simulate {
            config,
            exec,
            start_delay_ms,
            health_check,
        } => {
            let sim = SimConfig {
                start_delay: Duration::from_millis(start_delay_ms),
                health_check,
                ..SimConfig::default()
            };
            simulate(config, exec, sim).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(path: &PathBuf) -> anyhow::Result<FleetConfig> {
    FleetConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn check(path: PathBuf) -> anyhow::Result<()> {
    let config = load(&path)?;
    let services: Vec<&str> = config.services.keys().map(String::as_str).collect();
    let resolved = ResolvedFleet {
        name: &config.fleet.name,
        target: config.fleet.target,
        per_service: fleet_core::per_service_target(config.fleet.target, services.len()),
        services,
        poll_interval_ms: config.poll_interval()?.as_millis() as u64,
        ready_timeout_ms: config.ready_timeout()?.as_millis() as u64,
        scaling: config.scaling.policy,
        threshold: config.scaling.threshold,
        readiness: config.readiness.policy,
    };
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

async fn simulate(path: PathBuf, exec: Option<String>, sim: SimConfig) -> anyhow::Result<()> {
    let config = load(&path)?;
    let runtime: Arc<dyn Runtime> = Arc::new(SimRuntime::new(sim));
    let controller = FleetController::from_config(&config, runtime)?;

    info!(
        fleet = %config.fleet.name,
        target = config.fleet.target,
        scaling = controller.scaling_policy(),
        readiness = controller.readiness_policy(),
        "fleetd starting"
    );

    controller.start().await;
    if controller.wait_ready().await {
        for service in controller.health().await? {
            info!(
                service = %service.service,
                running = service.running,
                pending = service.pending,
                unhealthy = service.unhealthy,
                "service ready"
            );
        }
    } else {
        warn!("fleet did not become ready; continuing");
    }

    if let Some(script) = exec {
        let request = ExecRequest::new(["sh", "-c", script.as_str()], Target::MinimumLoad);
        let options = RetryOptions::with_timeout(config.ready_timeout()?);
        match try_until(options, || controller.run_exec(&request)).await {
            Ok((worker, output)) => {
                info!(worker = %worker.id, service = %worker.service, "execution finished");
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
            }
            Err(e) => warn!(error = %e, "execution failed"),
        }
    }

    info!("running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");

    let removed = controller.stop().await?;
    info!(removed, "fleetd stopped");
    Ok(())
}
