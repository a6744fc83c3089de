//! pcap-indexer CLI entry point.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pcap_indexer::{Config, MetricsRegistry, MetricsServer, PcapIndexer, Pipeline, RunSummary};

/// Index a packet capture into Elasticsearch and expose Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "pcap-indexer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file to process (pcap or pcapng)
    #[arg(long = "pcap", value_name = "FILE", env = "PCAP_FILE")]
    pcap: Option<PathBuf>,

    /// Records per bulk request; 1 indexes records one at a time
    #[arg(long = "batch-size", value_name = "N")]
    batch_size: Option<usize>,

    /// Exit once the capture is processed instead of serving metrics until Ctrl+C
    #[arg(long = "exit-on-complete")]
    exit_on_complete: bool,

    /// Verbose output (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match run(args).await {
        Ok(summary) => {
            info!(
                "Done: {} packets, {} indexed, {} failed, {} skipped",
                summary.processed, summary.succeeded, summary.failed, summary.skipped
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<RunSummary> {
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size.max(1);
    }

    let pcap_path = match args.pcap.or_else(|| config.pcap_file.clone()) {
        Some(path) => path,
        None => bail!("No capture file given. Use --pcap or set PCAP_FILE."),
    };
    if !pcap_path.exists() {
        bail!("Capture file not found: {}", pcap_path.display());
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let metrics_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    let server = MetricsServer::start(metrics_addr, Arc::clone(&metrics))
        .await
        .context("Failed to start metrics server")?;

    let client = match PcapIndexer::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Elasticsearch unavailable, continuing without delivery: {}", e);
            None
        }
    };

    let mut capture = PcapIndexer::open(&pcap_path)
        .with_context(|| format!("Failed to open capture {}", pcap_path.display()))?;
    info!("Processing {} ({})", pcap_path.display(), capture.format());

    let pipeline = Pipeline::new(&metrics).with_batch_size(config.batch_size);
    let summary = match &client {
        Some(client) => pipeline.with_client(client).run_capture(&mut capture).await,
        None => pipeline.run_capture(&mut capture).await,
    }
    .context("Capture processing aborted")?;

    if !args.exit_on_complete {
        info!(
            "Metrics available at http://{}/metrics, press Ctrl+C to exit",
            server.local_addr()
        );
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
        }
    }

    server.shutdown().await;
    Ok(summary)
}
