use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use reqwest::Client;
use tokio::{runtime::Builder, signal, sync::watch, task};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mongoshake_exporter::exporter::{http_server, normalize_targets, Poller, ReplicationMetrics};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "MongoShake exporter - republishes collector replication status as Prometheus gauges"
)]
struct Args {
    /// Comma-separated list of MongoShake status endpoints
    #[arg(
        long = "scrape-url",
        env = "SCRAPE_URL",
        value_delimiter = ',',
        default_value = "http://localhost:9100/repl",
        help = "Comma-separated list of MongoShake /repl endpoints to scrape"
    )]
    scrape_url: Vec<String>,

    /// Seconds to wait between the end of one scrape round and the start of the next
    #[arg(
        long = "scrape-interval",
        env = "SCRAPE_INTERVAL",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Interval in seconds between scrape rounds"
    )]
    scrape_interval: u64,

    #[arg(
        long = "max-concurrent-fetches",
        env = "SCRAPE_CONCURRENCY",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..),
        help = "Maximum number of targets fetched at once (default: all)"
    )]
    max_concurrent_fetches: Option<usize>,

    #[arg(
        short,
        long,
        env = "METRICS_PORT",
        default_value_t = 8000,
        help = "Prometheus metrics HTTP port"
    )]
    port: u16,

    #[arg(
        long = "listen-address",
        env = "METRICS_LISTEN_ADDRESS",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        help = "Address the metrics server binds to"
    )]
    listen_address: IpAddr,
}

fn main() -> anyhow::Result<()> {
    // parse command line arguments and environment
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // one worker for the poller, one for the metrics server
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let res = rt.block_on(run_exporter(args));

    if let Err(err) = res {
        error!("{:#}", err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_exporter(args: Args) -> anyhow::Result<()> {
    let targets = normalize_targets(&args.scrape_url);
    if targets.is_empty() {
        bail!("No valid scrape targets provided");
    }

    let metrics = Arc::new(ReplicationMetrics::new().context("failed to register metrics")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                error!(error = %err, "unable to listen for shutdown signal");
            }
        }
    });

    let metrics_addr = SocketAddr::new(args.listen_address, args.port);
    let listener = http_server::bind(metrics_addr).await?;

    info!(
        targets = targets.len(),
        interval_secs = args.scrape_interval,
        max_concurrent_fetches = ?args.max_concurrent_fetches,
        metrics = %format!("http://{}/metrics", metrics_addr),
        "MongoShake exporter started"
    );
    for target in &targets {
        info!(url = %target, "scrape target");
    }

    let metrics_task = task::spawn(http_server::serve(
        metrics.clone(),
        listener,
        shutdown_rx.clone(),
    ));

    let client = Client::builder()
        .user_agent(concat!("mongoshake-exporter/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let poller = Poller::new(
        client,
        targets,
        Duration::from_secs(args.scrape_interval),
        metrics,
    )
    .with_max_concurrent_fetches(args.max_concurrent_fetches);

    poller.run(shutdown_rx).await;

    metrics_task.await??;

    info!("Exiting.");
    Ok(())
}
