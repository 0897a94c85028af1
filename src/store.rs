// src/store.rs

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[source] BoxError),
    #[error("failed to read response body: {0}")]
    Body(#[source] BoxError),
    #[error("response is missing {0}")]
    MissingField(&'static str),
}

/// Identifies one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// What the store reports about an object before any part is fetched.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    /// Number of parts the object was uploaded in. `None` when the store
    /// does not report one.
    pub parts_count: Option<u32>,
    /// Length of the part the metadata request was made against.
    pub content_length: Option<u64>,
    /// User-defined metadata attached to the object.
    pub metadata: HashMap<String, String>,
}

/// One downloaded part as handed back by the store.
#[derive(Debug, Clone)]
pub struct PartBody {
    /// Length announced by the store for this part.
    pub declared_len: u64,
    /// Bytes actually received.
    pub data: Bytes,
}

/// Object storage able to serve an object part by part.
///
/// Part numbers are 1-based.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn head(&self, locator: &ObjectLocator) -> Result<ObjectMeta, StoreError>;

    async fn get_part(
        &self,
        locator: &ObjectLocator,
        part_number: u32,
    ) -> Result<PartBody, StoreError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable in-memory store used by the unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub(crate) enum Behavior {
        /// Serve the part after the given delay.
        Ok(Duration),
        /// Announce the real length but deliver only `actual` bytes.
        Short { delay: Duration, actual: usize },
        /// Fail the request after the given delay.
        Error(Duration),
    }

    pub(crate) struct MemoryStore {
        parts: Vec<Bytes>,
        behaviors: Vec<Behavior>,
        parts_count: Option<u32>,
        metadata: HashMap<String, String>,
        head_fails: bool,
        running: AtomicUsize,
        peak_running: AtomicUsize,
        requested: Mutex<Vec<u32>>,
        completed: Mutex<Vec<u32>>,
    }

    impl MemoryStore {
        /// Builds a store whose part `i` (1-based) is `parts[i - 1]`, all
        /// served without delay.
        pub(crate) fn new(parts: Vec<Vec<u8>>) -> Self {
            let behaviors = vec![Behavior::Ok(Duration::ZERO); parts.len()];
            Self {
                parts_count: Some(parts.len() as u32),
                parts: parts.into_iter().map(Bytes::from).collect(),
                behaviors,
                metadata: HashMap::new(),
                head_fails: false,
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
            }
        }

        /// `count` parts of `size` bytes, each filled with its own part number.
        pub(crate) fn uniform(count: usize, size: usize) -> Self {
            Self::new((1..=count).map(|n| vec![n as u8; size]).collect())
        }

        pub(crate) fn with_behavior(mut self, part_number: u32, behavior: Behavior) -> Self {
            self.behaviors[part_number as usize - 1] = behavior;
            self
        }

        pub(crate) fn with_delays(mut self, delays_ms: &[u64]) -> Self {
            for (i, ms) in delays_ms.iter().enumerate() {
                self.behaviors[i] = Behavior::Ok(Duration::from_millis(*ms));
            }
            self
        }

        pub(crate) fn without_parts_count(mut self) -> Self {
            self.parts_count = None;
            self
        }

        pub(crate) fn with_head_error(mut self) -> Self {
            self.head_fails = true;
            self
        }

        pub(crate) fn with_metadata(mut self, key: &str, value: &str) -> Self {
            self.metadata.insert(key.to_string(), value.to_string());
            self
        }

        pub(crate) fn peak_running(&self) -> usize {
            self.peak_running.load(Ordering::SeqCst)
        }

        pub(crate) fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }

        /// Part numbers in the order their responses were produced.
        pub(crate) fn completed(&self) -> Vec<u32> {
            self.completed.lock().unwrap().clone()
        }

        pub(crate) fn concatenated(&self) -> Vec<u8> {
            self.parts.iter().flat_map(|p| p.iter().copied()).collect()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn head(&self, _locator: &ObjectLocator) -> Result<ObjectMeta, StoreError> {
            if self.head_fails {
                return Err(StoreError::Request("access denied".into()));
            }
            Ok(ObjectMeta {
                parts_count: self.parts_count,
                content_length: self.parts.first().map(|p| p.len() as u64),
                metadata: self.metadata.clone(),
            })
        }

        async fn get_part(
            &self,
            _locator: &ObjectLocator,
            part_number: u32,
        ) -> Result<PartBody, StoreError> {
            self.requested.lock().unwrap().push(part_number);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_running.fetch_max(now, Ordering::SeqCst);

            let index = part_number as usize - 1;
            let data = self.parts[index].clone();
            let result = match self.behaviors[index].clone() {
                Behavior::Ok(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(PartBody {
                        declared_len: data.len() as u64,
                        data,
                    })
                }
                Behavior::Short { delay, actual } => {
                    tokio::time::sleep(delay).await;
                    Ok(PartBody {
                        declared_len: data.len() as u64,
                        data: data.slice(..actual),
                    })
                }
                Behavior::Error(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(StoreError::Request("connection reset".into()))
                }
            };

            self.completed.lock().unwrap().push(part_number);
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
