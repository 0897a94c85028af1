// src/models.rs

use crate::downloader::PartFailureReason;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of a single part.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PartStatus {
    Pending,
    Running,
    Downloaded,
    Written,
    Failed,
}

/// One chunk of the remote object.
#[derive(Debug, Clone)]
pub struct Part {
    /// 1-based part number.
    pub index: u32,
    pub status: PartStatus,
    /// Held only while the part is `Downloaded`.
    pub payload: Option<Bytes>,
    pub elapsed: Duration,
    pub declared_size: u64,
    pub actual_size: u64,
}

impl Part {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            status: PartStatus::Pending,
            payload: None,
            elapsed: Duration::ZERO,
            declared_size: 0,
            actual_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartCounts {
    pub started: usize,
    pub running: usize,
    /// Downloaded and waiting to be written.
    pub downloaded: usize,
    pub written: usize,
    pub failed: usize,
}

/// Aggregate figures reported once every part is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub total_bytes: u64,
    pub parts: u32,
    pub max_part_secs: f64,
    pub avg_part_secs: f64,
    /// Highest number of downloaded-but-unwritten payloads held at once.
    pub peak_buffered_parts: usize,
}

/// State of all parts of one object download.
///
/// Owned by the coordinator alone; workers only ever see a part number.
#[derive(Debug)]
pub struct DownloadJob {
    pub total_parts: u32,
    pub max_concurrency: usize,
    pub max_buffered_parts: usize,
    parts: Vec<Part>,
    counts: PartCounts,
    bytes_written: u64,
    total_part_time: Duration,
    max_part_time: Duration,
    peak_buffered_parts: usize,
}

impl DownloadJob {
    pub fn new(total_parts: u32, max_concurrency: usize, max_buffered_parts: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            total_parts,
            max_concurrency,
            max_buffered_parts: max_buffered_parts.max(max_concurrency),
            parts: Vec::with_capacity(total_parts as usize),
            counts: PartCounts::default(),
            bytes_written: 0,
            total_part_time: Duration::ZERO,
            max_part_time: Duration::ZERO,
            peak_buffered_parts: 0,
        }
    }

    pub fn counts(&self) -> PartCounts {
        self.counts
    }

    pub fn part(&self, index: u32) -> Option<&Part> {
        index
            .checked_sub(1)
            .and_then(|i| self.parts.get(i as usize))
    }

    pub fn is_complete(&self) -> bool {
        self.counts.written == self.total_parts as usize
    }

    pub fn has_failed(&self) -> bool {
        self.counts.failed > 0
    }

    /// Whether another part may be dispatched right now.
    ///
    /// Payloads waiting to be written count against the window so that
    /// memory stays bounded when an early part is slow.
    pub fn can_dispatch(&self) -> bool {
        let c = &self.counts;
        !self.has_failed()
            && c.started < self.total_parts as usize
            && c.running < self.max_concurrency
            && c.running + c.downloaded < self.max_buffered_parts
    }

    /// Creates the next part in `Running` state and returns its number.
    pub fn start_next(&mut self) -> Option<u32> {
        if !self.can_dispatch() {
            return None;
        }
        let index = self.parts.len() as u32 + 1;
        let mut part = Part::new(index);
        part.status = PartStatus::Running;
        self.parts.push(part);
        self.counts.started += 1;
        self.counts.running += 1;
        Some(index)
    }

    /// Records a finished download. The part fails when the received byte
    /// count differs from the declared one.
    pub fn record_download(
        &mut self,
        index: u32,
        declared: u64,
        data: Bytes,
        elapsed: Duration,
    ) -> Result<(), PartFailureReason> {
        let actual = data.len() as u64;
        let Some(part) = self.running_part_mut(index) else {
            return Ok(());
        };
        part.elapsed = elapsed;
        part.declared_size = declared;
        part.actual_size = actual;

        if actual != declared {
            part.status = PartStatus::Failed;
            self.counts.running -= 1;
            self.counts.failed += 1;
            return Err(PartFailureReason::SizeMismatch { declared, actual });
        }

        part.status = PartStatus::Downloaded;
        part.payload = Some(data);
        self.counts.running -= 1;
        self.counts.downloaded += 1;
        self.peak_buffered_parts = self.peak_buffered_parts.max(self.counts.downloaded);
        Ok(())
    }

    pub fn record_failure(&mut self, index: u32, elapsed: Duration) {
        if let Some(part) = self.running_part_mut(index) {
            part.elapsed = elapsed;
            part.status = PartStatus::Failed;
            self.counts.running -= 1;
            self.counts.failed += 1;
        }
    }

    /// Hands out the payload of the next part in order, if it has arrived.
    ///
    /// The part keeps no reference to the payload afterwards.
    pub fn take_next_writable(&mut self) -> Option<(u32, Bytes)> {
        let next = self.counts.written;
        let part = self.parts.get_mut(next)?;
        if part.status != PartStatus::Downloaded {
            return None;
        }
        let payload = part.payload.take()?;
        Some((part.index, payload))
    }

    /// Marks a part handed out by [`take_next_writable`](Self::take_next_writable)
    /// as written and folds it into the running totals.
    pub fn mark_written(&mut self, index: u32) {
        let Some(part) = index
            .checked_sub(1)
            .and_then(|i| self.parts.get_mut(i as usize))
        else {
            return;
        };
        if part.status != PartStatus::Downloaded {
            return;
        }
        part.status = PartStatus::Written;
        self.counts.downloaded -= 1;
        self.counts.written += 1;
        self.bytes_written += part.actual_size;
        self.total_part_time += part.elapsed;
        self.max_part_time = self.max_part_time.max(part.elapsed);
    }

    pub fn stats(&self) -> DownloadStats {
        let avg_part_secs = if self.total_parts == 0 {
            0.0
        } else {
            self.total_part_time.as_secs_f64() / self.total_parts as f64
        };
        DownloadStats {
            total_bytes: self.bytes_written,
            parts: self.total_parts,
            max_part_secs: self.max_part_time.as_secs_f64(),
            avg_part_secs,
            peak_buffered_parts: self.peak_buffered_parts,
        }
    }

    fn running_part_mut(&mut self, index: u32) -> Option<&mut Part> {
        let part = index
            .checked_sub(1)
            .and_then(|i| self.parts.get_mut(i as usize))?;
        (part.status == PartStatus::Running).then_some(part)
    }
}
