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
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::{error, info};

use greenwave_n::node::Node;
use greenwave_n::peer::PeerState;
use greenwave_n::select_light;
use greenwave_o::config::TopologyConfig;
use greenwave_o::logging::{self, LogLevel};
use greenwave_o::metrics::RttSink;
use greenwave_o::transport::GrpcTransport;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Greenwave-N traffic-light node.
///
/// Example:
///   greenwave-n --config topology.yaml --light /tl/1
///   greenwave-n --config topology.yaml --index 0 --seed 42
#[derive(Debug, Parser)]
#[command(
    name = "greenwave-n",
    about = "Greenwave-N – runs one traffic light of the grid",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML topology file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Name of the light to run.
    #[arg(short = 'n', long = "light", conflicts_with = "index")]
    light: Option<String>,

    /// Position of the light to run in the topology file.
    #[arg(short = 'i', long = "index", required_unless_present = "light")]
    index: Option<usize>,

    /// Default log level when RUST_LOG is not set.
    #[arg(short = 'l', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Append every command-poll round trip (ms) to this file.
    #[arg(long = "rtt-log")]
    rtt_log: Option<PathBuf>,

    /// Seed for the synthetic traffic generator (random if omitted).
    #[arg(long = "seed")]
    seed: Option<u64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    info!("Greenwave-N starting up...");
    info!(
        config = %cli.config.display(),
        light  = ?cli.light,
        index  = ?cli.index,
        seed   = ?cli.seed,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("Greenwave-N failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let topology = TopologyConfig::load_from_file(&cli.config)?;
    let light = select_light(&topology, cli.light.as_deref(), cli.index)?;

    let address = light
        .address
        .as_deref()
        .with_context(|| format!("No address configured for {}", light.name))?;
    let listen: SocketAddr = address
        .parse()
        .with_context(|| format!("Invalid address for {}: {}", light.name, address))?;

    let transport = Arc::new(
        GrpcTransport::new().with_route(
            topology.orchestrator.prefix.clone(),
            &topology.orchestrator.address,
        ),
    );

    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let peer = PeerState::new(light, &topology.timing, rng);
    let sink = match &cli.rtt_log {
        Some(path) => RttSink::open(path)?,
        None => RttSink::disabled(),
    };
    let node = Node::new(
        peer,
        &topology.orchestrator.prefix,
        &topology.timing,
        transport.clone(),
    )
    .with_rtt_sink(sink);

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

    node.run(shutdown_rx).await?;
    server
        .await
        .context("Exchange server task panicked")?
        .context("Exchange server failed")?;
    Ok(())
}
