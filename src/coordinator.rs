// src/coordinator.rs

use crate::downloader::{DownloadError, PartFailureReason};
use crate::models::{DownloadJob, DownloadStats};
use crate::store::{ObjectLocator, ObjectStore, PartBody, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Result of one part download, sent back by its worker.
struct PartOutcome {
    index: u32,
    elapsed: Duration,
    result: Result<PartBody, StoreError>,
}

/// Single driver of a download: decides when to dispatch a part and when
/// to write one. It alone owns the part state and the output file.
pub(crate) struct Coordinator {
    store: Arc<dyn ObjectStore>,
    locator: Arc<ObjectLocator>,
    job: DownloadJob,
    output: File,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl Coordinator {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        locator: ObjectLocator,
        job: DownloadJob,
        output: File,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            locator: Arc::new(locator),
            job,
            output,
            poll_interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Runs until every part is written or the first part fails.
    ///
    /// The output file is closed when this returns; removing it after a
    /// failure is up to the caller.
    pub(crate) async fn run(mut self) -> Result<DownloadStats, DownloadError> {
        let (tx, mut rx) = mpsc::channel(self.job.max_concurrency);
        let result = self.drive(&tx, &mut rx).await;
        if result.is_err() {
            // Workers that have not sent their request yet skip it; the
            // rest finish on their own and their results are dropped with `rx`.
            self.cancel.cancel();
        }
        result
    }

    async fn drive(
        &mut self,
        tx: &mpsc::Sender<PartOutcome>,
        rx: &mut mpsc::Receiver<PartOutcome>,
    ) -> Result<DownloadStats, DownloadError> {
        loop {
            while let Ok(outcome) = rx.try_recv() {
                self.absorb(outcome)?;
            }
            if self.job.is_complete() {
                break;
            }

            if let Some(index) = self.job.start_next() {
                self.dispatch(index, tx.clone());
                continue;
            }
            if let Some((index, payload)) = self.job.take_next_writable() {
                self.write_part(index, payload).await?;
                continue;
            }

            // At the limit and the next part has not arrived yet.
            match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                Ok(Some(outcome)) => self.absorb(outcome)?,
                Ok(None) => {}
                Err(_) => self.log_progress(),
            }
        }

        self.output.flush().await?;
        self.log_progress();
        Ok(self.job.stats())
    }

    fn dispatch(&self, index: u32, tx: mpsc::Sender<PartOutcome>) {
        let store = self.store.clone();
        let locator = self.locator.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            debug!("Starting thread {}", index);
            let started = Instant::now();
            let result = store.get_part(&locator, index).await;
            let outcome = PartOutcome {
                index,
                elapsed: started.elapsed(),
                result,
            };
            // The receiver is gone once the download has been aborted.
            let _ = tx.send(outcome).await;
        });
    }

    fn absorb(&mut self, outcome: PartOutcome) -> Result<(), DownloadError> {
        let PartOutcome {
            index,
            elapsed,
            result,
        } = outcome;

        let reason = match result {
            Ok(body) => {
                let size = body.data.len();
                match self
                    .job
                    .record_download(index, body.declared_len, body.data, elapsed)
                {
                    Ok(()) => {
                        debug!("Ending thread {}, size {}", index, size);
                        return Ok(());
                    }
                    Err(reason) => reason,
                }
            }
            Err(e) => {
                self.job.record_failure(index, elapsed);
                PartFailureReason::Transport(e)
            }
        };

        error!("Thread {} failed: {}", index, reason);
        Err(DownloadError::PartFailure {
            part: index,
            reason,
        })
    }

    async fn write_part(&mut self, index: u32, payload: Bytes) -> Result<(), DownloadError> {
        self.output.write_all(&payload).await?;
        // Release the buffer before the next part is considered.
        drop(payload);
        self.job.mark_written(index);

        if let Some(part) = self.job.part(index) {
            debug!(
                "Downloaded part {} in {:.3} seconds",
                index,
                part.elapsed.as_secs_f64()
            );
        }
        Ok(())
    }

    fn log_progress(&self) {
        let c = self.job.counts();
        info!(
            "parts: total {}, started {}, running {}, downloaded {}, written {}",
            self.job.total_parts, c.started, c.running, c.downloaded, c.written
        );
    }
}
