use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::fs::File;
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::models::{DownloadJob, DownloadStats};
use crate::store::{ObjectLocator, ObjectMeta, ObjectStore, StoreError};

/// Upper bound on parallel part downloads, whatever the caller asks for.
pub const MAX_CONCURRENCY: usize = 10;

/// Why a single part could not be used.
#[derive(Debug, Error)]
pub enum PartFailureReason {
    #[error("expected {declared} bytes, got {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
    #[error(transparent)]
    Transport(#[from] StoreError),
}

/// Custom errors for download operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("cannot read metadata of {locator}: {source}")]
    Metadata {
        locator: ObjectLocator,
        #[source]
        source: StoreError,
    },
    #[error("{locator} does not report a part count")]
    MissingPartCount { locator: ObjectLocator },
    #[error("part {part} failed: {reason}")]
    PartFailure {
        part: u32,
        #[source]
        reason: PartFailureReason,
    },
    #[error("write error: {0}")]
    Write(#[from] std::io::Error),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Options for a download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Where to write the object's user metadata as JSON, if it has any.
    pub metadata_file: Option<PathBuf>,
    /// Requested number of concurrent part downloads. Clamped to
    /// `1..=MAX_CONCURRENCY`.
    pub threads: usize,
    /// Longest the coordinator waits for a part result before re-checking
    /// and logging progress.
    pub poll_interval: Duration,
    /// Cap on parts held in memory (running plus waiting to be written).
    /// Defaults to the effective concurrency.
    pub max_buffered_parts: Option<usize>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            metadata_file: None,
            threads: 5,
            poll_interval: Duration::from_secs(5),
            max_buffered_parts: None,
        }
    }
}

impl DownloadOptions {
    pub fn effective_concurrency(&self) -> usize {
        self.threads.clamp(1, MAX_CONCURRENCY)
    }

    fn validate(&self) -> Result<(), DownloadError> {
        if self.poll_interval.is_zero() {
            return Err(DownloadError::InvalidOptions(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.max_buffered_parts == Some(0) {
            return Err(DownloadError::InvalidOptions(
                "max buffered parts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Downloads one multipart object into a local file, part by part.
pub struct Downloader {
    store: Arc<dyn ObjectStore>,
    options: DownloadOptions,
}

impl Downloader {
    pub fn new(store: Arc<dyn ObjectStore>, options: DownloadOptions) -> Self {
        Self { store, options }
    }

    /// Fetches every part of `locator` and writes them, in part order, to
    /// `destination`.
    ///
    /// On any failure the destination file is removed and the first error
    /// observed is returned.
    pub async fn fetch(
        &self,
        locator: &ObjectLocator,
        destination: &Path,
    ) -> Result<DownloadStats, DownloadError> {
        self.options.validate()?;

        info!("Getting object metadata from {}", locator);
        let meta = self
            .store
            .head(locator)
            .await
            .map_err(|source| DownloadError::Metadata {
                locator: locator.clone(),
                source,
            })?;
        let total_parts = match meta.parts_count {
            Some(n) if n > 0 => n,
            _ => {
                return Err(DownloadError::MissingPartCount {
                    locator: locator.clone(),
                })
            }
        };

        info!("S3 object parts: {}", total_parts);
        if let Some(len) = meta.content_length {
            info!("First part size: {} bytes", len);
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let output = File::create(destination).await?;

        self.download_into(locator, &meta, total_parts, output, destination)
            .await
    }

    /// Runs the part downloads into an already opened `output`. The file at
    /// `destination` is removed when the download fails.
    async fn download_into(
        &self,
        locator: &ObjectLocator,
        meta: &ObjectMeta,
        total_parts: u32,
        output: File,
        destination: &Path,
    ) -> Result<DownloadStats, DownloadError> {
        let concurrency = self.options.effective_concurrency();
        let buffered = self.options.max_buffered_parts.unwrap_or(concurrency);
        info!("Max running threads: {}", concurrency);

        info!("Downloading parts of data from {}...", locator);
        let job = DownloadJob::new(total_parts, concurrency, buffered);
        let coordinator = Coordinator::new(
            self.store.clone(),
            locator.clone(),
            job,
            output,
            self.options.poll_interval,
        );

        let stats = match coordinator.run().await {
            Ok(stats) => stats,
            Err(e) => {
                remove_partial(destination).await;
                return Err(e);
            }
        };

        info!(
            "All parts downloaded: total_size_read {}, max_read_secs {:.3}, avg_read_secs {:.3}",
            stats.total_bytes, stats.max_part_secs, stats.avg_part_secs
        );

        if let Some(path) = &self.options.metadata_file {
            if !meta.metadata.is_empty() {
                info!("Writing metadata to {}", path.display());
                let json = serde_json::to_vec(&meta.metadata)
                    .map_err(|e| DownloadError::Write(e.into()))?;
                tokio::fs::write(path, json).await?;
            }
        }

        Ok(stats)
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed incomplete file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove incomplete file {}: {}", path.display(), e),
    }
}
