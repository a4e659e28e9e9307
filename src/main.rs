//! connpool: drive a TCP connection pool from a config file.
//!
//! # Architecture Overview
//!
//! ```text
//!   workers ──conn()──▶ ┌──────────────┐   select   ┌────────┐  opener   ┌─────────┐
//!                       │    Nodes     │──────────▶ │  Node  │─────────▶ │ backend │
//!   workers ◀─Routed──  │  (selector)  │ ◀───────── │ (idle, │ ◀──────── │  (TCP)  │
//!                       └──────────────┘    put()   │ queue) │           └─────────┘
//!                              ▲                    └────────┘
//!                              │ set_max_open / set_max_idle
//!                       config watcher
//! ```

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use connpool::config::loader::load_config;
use connpool::config::watcher::{apply_updates, ConfigWatcher, LiveConfig};
use connpool::config::PoolConfig;
use connpool::lifecycle::signals::shutdown_on_signal;
use connpool::lifecycle::startup::{build_pool, TcpPool};
use connpool::lifecycle::Shutdown;
use connpool::observability::{logging, metrics};
use connpool::{ConnPool, PoolStats};

#[derive(Parser)]
#[command(name = "connpool")]
#[command(about = "Run and inspect a TCP connection pool", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print it
    Check,
    /// Exercise the pool with concurrent workers and print final stats
    Probe {
        /// Concurrent workers
        #[arg(long, default_value_t = 8)]
        workers: usize,
        /// Acquire/release cycles per worker
        #[arg(long, default_value_t = 100)]
        rounds: usize,
        /// How long each worker holds a connection
        #[arg(long, default_value_t = 0)]
        hold_ms: u64,
        /// Apply limit changes from the config file while running
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Serialize)]
struct BackendReport {
    name: String,
    stats: PoolStats,
}

#[derive(Serialize)]
struct ProbeReport {
    acquired: usize,
    failed: usize,
    elapsed_ms: u128,
    total: PoolStats,
    backends: Vec<BackendReport>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(config = ?cli.config, "connpool v0.1.0 starting");

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Probe {
            workers,
            rounds,
            hold_ms,
            watch,
        } => {
            let report = probe(&cli.config, config, workers, rounds, hold_ms, watch).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn probe(
    path: &std::path::Path,
    config: PoolConfig,
    workers: usize,
    rounds: usize,
    hold_ms: u64,
    watch: bool,
) -> Result<ProbeReport, Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?);
    }

    let acquire_timeout = config.limits.acquire_timeout();
    let pool = Arc::new(build_pool(&config)?);
    let shutdown = Arc::new(Shutdown::new());

    // Keep the watcher alive for the whole probe
    let _watcher = if watch {
        let (watcher, updates) = ConfigWatcher::new(path);
        let live = Arc::new(LiveConfig::new(config.clone()));
        tokio::spawn(apply_updates(live, pool.clone(), updates, shutdown.subscribe()));
        Some(watcher.run()?)
    } else {
        None
    };

    {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        let mut done = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_on_signal(&shutdown) => {
                    // Fails every queued worker instead of leaving it hanging
                    if let Err(e) = pool.close() {
                        tracing::warn!(error = %e, "Pool close reported errors");
                    }
                }
                _ = done.recv() => {}
            }
        });
    }

    let start = Instant::now();
    let results = join_all((0..workers).map(|worker| {
        let pool = pool.clone();
        async move { run_worker(worker, &pool, rounds, hold_ms, acquire_timeout).await }
    }))
    .await;

    let (acquired, failed) = results
        .iter()
        .fold((0, 0), |(ok, err), &(a, f)| (ok + a, err + f));

    let backends = pool
        .backends()
        .iter()
        .map(|node| {
            let stats = node.stats();
            metrics::record_stats(node.name(), &stats);
            BackendReport {
                name: node.name().to_string(),
                stats,
            }
        })
        .collect();
    let report = ProbeReport {
        acquired,
        failed,
        elapsed_ms: start.elapsed().as_millis(),
        total: pool.stats(),
        backends,
    };

    shutdown.trigger();
    pool.close()?;
    tracing::info!(acquired, failed, "Probe complete");
    Ok(report)
}

async fn run_worker(
    worker: usize,
    pool: &TcpPool,
    rounds: usize,
    hold_ms: u64,
    acquire_timeout: Duration,
) -> (usize, usize) {
    let (mut acquired, mut failed) = (0, 0);
    for _ in 0..rounds {
        match pool.conn_timeout(acquire_timeout).await {
            Ok(conn) => {
                acquired += 1;
                if hold_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                }
                pool.put(conn);
            }
            Err(e) if e.is_closed() => break,
            Err(e) => {
                failed += 1;
                tracing::warn!(worker, error = %e, "Acquire failed");
            }
        }
    }
    (acquired, failed)
}
