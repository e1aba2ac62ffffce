/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! grid-sim – runs the orchestrator and every configured light in one
//! process over the in-memory transport.
//!
//! A killed light has both directions of its traffic dropped: the
//! orchestrator's status polls and the node's command polls.  The
//! orchestrator marks it UNKNOWN and the node falls into ALERT.  Reviving
//! clears the faults and lets the recovery path bring it back.
//!
//! Usage:
//!   grid-sim --config topology.yaml --seconds 60 --seed 7 \
//!            --kill /tl/1@10 --revive /tl/1@25

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use greenwave_n::node::Node;
use greenwave_n::peer::PeerState;
use greenwave_o::config::TopologyConfig;
use greenwave_o::logging::{self, LogLevel};
use greenwave_o::orchestrator::Orchestrator;
use greenwave_o::protocol::{command_name, normalize_name};
use greenwave_o::transport::{Fault, MemoryTransport};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "grid-sim", about = "Greenwave in-process grid simulator")]
struct Cli {
    /// Path to the YAML topology file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// How long to run, in seconds.
    #[arg(short = 's', long = "seconds", default_value_t = 30)]
    seconds: u64,

    /// Base seed; light `i` uses `seed + i`.
    #[arg(long = "seed", default_value_t = 1)]
    seed: u64,

    /// Cut a light off at the given second, e.g. `/tl/1@10`.  Repeatable.
    #[arg(long = "kill")]
    kill: Vec<FaultAt>,

    /// Reconnect a light at the given second, e.g. `/tl/1@25`.  Repeatable.
    #[arg(long = "revive")]
    revive: Vec<FaultAt>,

    /// Seconds between grid snapshots in the log.
    #[arg(long = "report-every", default_value_t = 5)]
    report_every: u64,

    #[arg(short = 'l', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

/// `<light>@<second>`
#[derive(Debug, Clone)]
struct FaultAt {
    light: String,
    at: Duration,
}

impl FromStr for FaultAt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (light, secs) = s
            .rsplit_once('@')
            .ok_or_else(|| format!("expected <light>@<second>, got '{s}'"))?;
        let secs: u64 = secs
            .parse()
            .map_err(|_| format!("invalid second '{secs}' in '{s}'"))?;
        Ok(Self {
            light: normalize_name(light),
            at: Duration::from_secs(secs),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    if let Err(e) = run(cli).await {
        error!("grid-sim failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let topology = TopologyConfig::load_from_file(&cli.config)?;
    for event in cli.kill.iter().chain(&cli.revive) {
        if topology.light(&event.light).is_none() {
            bail!("Unknown light in fault schedule: {}", event.light);
        }
    }

    let net = MemoryTransport::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    let orchestrator = Orchestrator::new(&topology, Arc::new(net.clone()));
    let coordinator = orchestrator.coordinator();
    let rx = shutdown_rx.clone();
    tasks.spawn(async move { orchestrator.run(rx).await });

    for (i, light) in topology.lights.iter().enumerate() {
        let rng = StdRng::seed_from_u64(cli.seed.wrapping_add(i as u64));
        let peer = PeerState::new(light, &topology.timing, rng);
        let node = Node::new(
            peer,
            &topology.orchestrator.prefix,
            &topology.timing,
            Arc::new(net.clone()),
        );
        tasks.spawn(node.run(shutdown_rx.clone()));
    }
    info!(
        lights = topology.lights.len(),
        seconds = cli.seconds,
        seed = cli.seed,
        "Grid running"
    );

    let prefix = topology.orchestrator.prefix.clone();
    let mut schedule: Vec<(Duration, bool, String)> = cli
        .kill
        .iter()
        .map(|f| (f.at, true, f.light.clone()))
        .chain(cli.revive.iter().map(|f| (f.at, false, f.light.clone())))
        .collect();
    schedule.sort_by_key(|(at, _, _)| *at);
    let faults = {
        let net = net.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            for (at, kill, light) in schedule {
                tokio::time::sleep_until(start + at).await;
                let commands = command_name(&prefix, &light);
                if kill {
                    warn!(light = %light, "Cutting light off");
                    net.inject(&light, Fault::Drop).await;
                    net.inject(&commands, Fault::Drop).await;
                } else {
                    warn!(light = %light, "Reconnecting light");
                    net.clear(&light).await;
                    net.clear(&commands).await;
                }
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(cli.seconds);
    let mut report = tokio::time::interval(Duration::from_secs(cli.report_every.max(1)));
    loop {
        tokio::select! {
            _ = report.tick() => {
                let now = Instant::now();
                let coordinator = coordinator.lock().await;
                let grid: Vec<String> = coordinator
                    .lights()
                    .map(|l| format!("{}={}({}ms)", l.name, l.state, l.remaining_ms(now)))
                    .collect();
                info!(grid = %grid.join(" "), "Snapshot");
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    faults.abort();
    let _ = shutdown_tx.send(true);
    while let Some(done) = tasks.join_next().await {
        done.context("Simulation task panicked")??;
    }
    info!("Grid stopped");
    Ok(())
}
