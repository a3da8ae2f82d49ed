//! Device Fabric simulator
//!
//! Builds a topology from a scenario file (or a generated ring), runs its
//! steps through the fabric and reports what was delivered.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use device_fabric::{FabricEvent, Scenario};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Device Fabric - simulate applications, devices and a motherboard routing between them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON); a ring topology is generated when absent
    #[arg(long, env = "FABRIC_SCENARIO")]
    scenario: Option<PathBuf>,

    /// Number of devices in the generated ring
    #[arg(long, env = "FABRIC_DEVICES", default_value = "8")]
    devices: u16,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    report_json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting Device Fabric simulator");
    info!("  Version: {}", device_fabric::VERSION);

    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)
            .with_context(|| format!("loading scenario {}", path.display()))?,
        None => {
            info!("  No scenario given, generating a ring of {} devices", args.devices);
            Scenario::ring(args.devices)
        }
    };

    let fabric = scenario.build().context("building topology")?;

    // Log fabric events until the motherboard goes away
    let mut events = fabric.motherboard().subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = fabric.run(&scenario.steps);
    drop(fabric);
    if let Err(e) = event_logger.await {
        error!("Event logger failed: {}", e);
    }

    for outcome in report.outcomes.iter().filter(|o| !o.ok) {
        warn!(
            step = %outcome.step,
            error = %outcome.detail.as_deref().unwrap_or("unknown"),
            "Step failed"
        );
    }
    info!(
        steps = report.outcomes.len(),
        failures = report.failures(),
        delivered = report.stats.unicast_delivered,
        dropped = report.stats.unicast_dropped,
        broadcasts = report.stats.broadcasts,
        delivery_ratio = report.stats.delivery_ratio(),
        "Scenario complete"
    );

    if args.report_json {
        let json = serde_json::to_string_pretty(&report).context("encoding report")?;
        println!("{json}");
    }

    Ok(())
}

fn log_event(event: &FabricEvent) {
    if event.is_membership_event() {
        info!(?event, "Fabric membership changed");
    } else {
        tracing::debug!(?event, "Fabric traffic");
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("tokio=warn".parse().context("parsing log directive")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
