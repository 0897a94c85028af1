// src/s3.rs

use crate::store::{ObjectLocator, ObjectMeta, ObjectStore, PartBody, StoreError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::debug;

/// Read timeout applied to every S3 request. Large parts can take a while.
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    /// Named profile from the shared credentials/config files.
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Alternative endpoint for S3-compatible services.
    pub endpoint_url: Option<String>,
}

/// [`ObjectStore`] backed by Amazon S3.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).timeout_config(
            TimeoutConfig::builder()
                .read_timeout(READ_TIMEOUT)
                .build(),
        );
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, locator: &ObjectLocator) -> Result<ObjectMeta, StoreError> {
        // Asking for part 1 makes S3 report the number of parts.
        let output = self
            .client
            .head_object()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .part_number(1)
            .send()
            .await
            .map_err(|e| StoreError::Request(Box::new(e)))?;

        Ok(ObjectMeta {
            parts_count: output.parts_count().and_then(|n| u32::try_from(n).ok()),
            content_length: output.content_length().and_then(|n| u64::try_from(n).ok()),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get_part(
        &self,
        locator: &ObjectLocator,
        part_number: u32,
    ) -> Result<PartBody, StoreError> {
        let part = i32::try_from(part_number).map_err(|_| {
            StoreError::Request(format!("part number {part_number} out of range").into())
        })?;

        let output = self
            .client
            .get_object()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .part_number(part)
            .send()
            .await
            .map_err(|e| StoreError::Request(Box::new(e)))?;

        let declared_len = output
            .content_length()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or(StoreError::MissingField("Content-Length"))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Body(Box::new(e)))?
            .into_bytes();

        debug!(part = part_number, declared_len, received = data.len(), "part body read");
        Ok(PartBody { declared_len, data })
    }
}
