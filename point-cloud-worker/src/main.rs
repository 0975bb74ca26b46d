/// LiDAR job worker entry point
use anyhow::{Context, Result};
use clap::Parser;
use point_cloud_worker::{
    JobEnvelope, JsonLinesPublisher, LocalObjectStore, MokaChunkCache, Worker, WorkerConfig,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Reads newline-delimited job envelopes and writes one result envelope per job to stdout.
#[derive(Parser, Debug)]
#[command(name = "point-cloud-worker", version, about)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Job file; stdin when omitted or "-"
    #[arg(value_name = "JOBS")]
    jobs: Option<PathBuf>,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_env("LIDAR_WORKER_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.json);

    let config = WorkerConfig::load(args.config.as_deref()).context("loading worker configuration")?;
    info!(
        storage = %config.storage.root.display(),
        bucket = %config.storage.bucket,
        chunk_size = config.processing.point_chunk_size,
        "Worker configured"
    );

    let worker = Worker::new(
        config.clone(),
        Arc::new(LocalObjectStore::new(&config.storage.root, &config.storage.bucket)),
        Arc::new(MokaChunkCache::new(config.cache_ttl(), config.cache.max_entries)),
        Arc::new(JsonLinesPublisher::new(io::stdout())),
    );

    let input: Box<dyn BufRead> = match &args.jobs {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening job file {}", path.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let mut handled = 0usize;
    for line in input.lines() {
        let line = line.context("reading job stream")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JobEnvelope>(&line) {
            Ok(envelope) => {
                worker.handle(envelope);
            }
            Err(e) => {
                worker.reject_malformed(&e);
            }
        }
        handled += 1;
    }

    info!(jobs = handled, "Job stream finished");
    Ok(())
}
