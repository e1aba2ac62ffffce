/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use greenwave_o::config::TopologyConfig;
use greenwave_o::logging::{self, LogLevel};
use greenwave_o::metrics::RttSink;
use greenwave_o::orchestrator::Orchestrator;
use greenwave_o::transport::GrpcTransport;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Greenwave-O traffic-light orchestrator.
///
/// Example:
///   greenwave-o --config topology.yaml --log-level info --rtt-log rtt.txt
#[derive(Debug, Parser)]
#[command(
    name = "greenwave-o",
    about = "Greenwave-O – coordinates a grid of traffic-light nodes",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML topology file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Default log level when RUST_LOG is not set.
    #[arg(short = 'l', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Append every status round trip (ms) to this file.
    #[arg(long = "rtt-log")]
    rtt_log: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    info!("Greenwave-O starting up...");
    info!(
        config  = %cli.config.display(),
        rtt_log = ?cli.rtt_log,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("Greenwave-O failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let topology = TopologyConfig::load_from_file(&cli.config)?;

    let listen: SocketAddr = topology
        .orchestrator
        .address
        .parse()
        .with_context(|| format!("Invalid orchestrator address: {}", topology.orchestrator.address))?;

    let mut transport = GrpcTransport::new();
    for light in &topology.lights {
        match &light.address {
            Some(address) => transport = transport.with_route(light.name.clone(), address),
            None => warn!(light = %light.name, "No address configured, light will stay UNKNOWN"),
        }
    }
    let transport = Arc::new(transport);

    let sink = match &cli.rtt_log {
        Some(path) => RttSink::open(path)?,
        None => RttSink::disabled(),
    };
    let orchestrator = Orchestrator::new(&topology, transport.clone()).with_rtt_sink(sink);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_shutdown = shutdown_rx.clone();
    let server_transport = Arc::clone(&transport);
    let server = tokio::spawn(async move {
        server_transport
            .serve(listen, async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            return;
        }
        info!("Ctrl-C received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    orchestrator.run(shutdown_rx).await?;
    server
        .await
        .context("Exchange server task panicked")?
        .context("Exchange server failed")?;
    Ok(())
}
