//! hasensor - Main Entry Point
//!
//! Parses the command line, assembles the sensors and runs the loop until
//! the node has no work left, fails, or the process is signalled.

use clap::Parser;
use hasensor::config::{CliArgs, NodeConfig};
use hasensor::error::{NodeError, NodeResult};
use hasensor::node::{drive, populate};
use hasensor::observability::init_default_logging;
use hasensor::scheduler::Scheduler;
use hasensor::sensor::SensorRegistry;
use hasensor::transport::mqtt::MqttBroker;
use std::process;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    init_default_logging();

    info!("Starting hasensor v{}", env!("CARGO_PKG_VERSION"));

    let config = match NodeConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_node(config).await {
        if e.is_startup_error() {
            error!("Failed to start sensor node: {}", e);
        } else {
            error!("Sensor node failed: {}", e);
        }
        process::exit(1);
    }

    info!("Sensor node shutdown complete");
}

async fn run_node(config: NodeConfig) -> NodeResult<()> {
    let registry = SensorRegistry::with_builtin_sensors()?;

    let broker = MqttBroker::connect(&config.broker, &config.client_id);
    let mut scheduler = Scheduler::new(broker, &config.prefix);

    let sensors = populate(&config, &registry, &mut scheduler)?;
    info!(
        sensors = sensors.len(),
        prefix = %config.prefix,
        "Sensor node running"
    );

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| NodeError::internal(format!("Failed to install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| NodeError::internal(format!("Failed to install SIGTERM handler: {e}")))?;

    tokio::select! {
        result = drive(&mut scheduler, &sensors) => {
            result?;
            info!("All events completed");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    Ok(())
}
