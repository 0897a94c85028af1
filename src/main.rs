// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use s3_fetch::logging::init_logging;
use s3_fetch::prelude::*;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

/// Download an S3 object in parts, several parts at a time, and reassemble
/// it in order into a local file.
#[derive(Debug, Parser)]
#[clap(name = "s3_fetch", version)]
struct Cli {
    /// AWS profile
    #[clap(short, long, env = "AWS_PROFILE")]
    profile: String,
    /// Name of file to be created with the S3 object
    #[clap(short, long)]
    file: PathBuf,
    /// S3 bucket
    #[clap(short, long)]
    bucket: String,
    /// S3 key
    #[clap(short = 's', long, alias = "s3-key", alias = "s3_key")]
    key: String,
    /// Name of local file to be created with S3 object metadata
    #[clap(short, long, alias = "metadata_file")]
    metadata_file: Option<PathBuf>,
    /// Number of threads for parallel download (at most 10 are used)
    #[clap(short, long, default_value_t = 5)]
    threads: usize,
    /// Debug level
    #[clap(short, long, alias = "debug_level", default_value = "INFO")]
    debug_level: String,
    /// Region override
    #[clap(long)]
    region: Option<String>,
    /// Endpoint of an S3-compatible service
    #[clap(long)]
    endpoint_url: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.debug_level);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = DownloadOptions {
        metadata_file: cli.metadata_file.clone(),
        threads: cli.threads,
        ..Default::default()
    };

    info!("profile: {}", cli.profile);
    info!("file: {}", cli.file.display());
    info!("bucket: {}", cli.bucket);
    info!("s3_key: {}", cli.key);
    info!("metadata_file: {:?}", cli.metadata_file);
    info!("threads: {}", options.effective_concurrency());

    let store = S3Store::connect(&S3Settings {
        profile: Some(cli.profile),
        region: cli.region,
        endpoint_url: cli.endpoint_url,
    })
    .await;

    let locator = ObjectLocator::new(cli.bucket, cli.key);
    let downloader = Downloader::new(Arc::new(store), options);
    let stats = downloader
        .fetch(&locator, &cli.file)
        .await
        .with_context(|| format!("download of {} failed", locator))?;

    info!(
        "Done: {} bytes in {} parts, slowest part {:.3}s, average part {:.3}s",
        stats.total_bytes, stats.parts, stats.max_part_secs, stats.avg_part_secs
    );
    Ok(())
}
