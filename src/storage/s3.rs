//! Object-storage backend over the S3 API.
//!
//! Transient failures (throttling, connection resets) are retried by
//! the SDK's standard retry mode with exponential back-off; not-found
//! and credential failures surface immediately and are never retried.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::{retry::RetryConfig, BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::Client;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{is_platform_artifact, ByteStream, Location, StorageBackend, StorageError};
use crate::config::S3Settings;

/// Upper bound on in-flight S3 requests from one process; unbounded
/// fan-out risks throttling.
const MAX_CONCURRENT_REQUESTS: usize = 32;

/// S3-compatible storage backend (AWS S3, MinIO and friends via a
/// custom endpoint).
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    request_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Build a client from resolved settings. Fails with `AccessDenied`
    /// if no credentials are configured; the credential *source* is the
    /// environment/config read at process start, never managed here.
    pub async fn connect(settings: &S3Settings) -> Result<Self, StorageError> {
        let (key_id, secret) = match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => {
                return Err(StorageError::AccessDenied(
                    "s3 credentials are not configured (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)"
                        .to_string(),
                ))
            }
        };

        let credentials = Credentials::new(key_id, secret, None, None, "mediadex-config");
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region.clone()))
            // 1 initial attempt + 3 retries with exponential back-off.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services.
            .force_path_style(true);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }

        debug!(region = %settings.region, "connecting s3 client");
        Ok(Self {
            client: Client::from_conf(builder.build()),
            request_limiter: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    fn bucket_and_key(location: &Location) -> Result<(&str, &str), StorageError> {
        match location {
            Location::S3 { bucket, key } => Ok((bucket, key)),
            _ => Err(StorageError::InvalidLocation(location.to_string())),
        }
    }

    async fn acquire_permit(&self) -> OwnedSemaphorePermit {
        // unwrap is safe: the semaphore is never closed
        self.request_limiter.clone().acquire_owned().await.unwrap()
    }

    fn map_sdk<E>(err: SdkError<E>, location: &Location) -> StorageError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        match err.code() {
            Some("NoSuchKey") | Some("NoSuchBucket") | Some("NotFound") => {
                StorageError::NotFound(location.to_string())
            }
            Some("AccessDenied") | Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch")
            | Some("ExpiredToken") => StorageError::AccessDenied(location.to_string()),
            Some("SlowDown") | Some("Throttling") | Some("ThrottlingException")
            | Some("RequestLimitExceeded") | Some("TooManyRequests") => {
                StorageError::Throttled(location.to_string())
            }
            _ => StorageError::Backend(format!("{}", DisplayErrorContext(err))),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        "s3"
    }

    async fn list(&self, location: &Location) -> Result<Vec<Location>, StorageError> {
        let (bucket, key) = Self::bucket_and_key(location)?;
        // Anchor the prefix at a segment boundary so `media` does not
        // also match `media2/...`.
        let prefix = if key.is_empty() || key.ends_with('/') {
            key.to_string()
        } else {
            format!("{}/", key)
        };

        let _permit = self.acquire_permit().await;
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();

        let mut found_any = false;
        let mut files = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| Self::map_sdk(e, location))?;
            for object in page.contents() {
                let Some(object_key) = object.key() else {
                    continue;
                };
                found_any = true;
                // Zero-byte "directory" placeholders end with a slash.
                if object_key.ends_with('/') {
                    continue;
                }
                let relative = object_key.strip_prefix(&prefix).unwrap_or(object_key);
                if is_platform_artifact(relative) {
                    continue;
                }
                files.push(Location::S3 {
                    bucket: bucket.to_string(),
                    key: object_key.to_string(),
                });
            }
        }

        if !found_any {
            return Err(StorageError::NotFound(location.to_string()));
        }
        Ok(files)
    }

    async fn open(&self, location: &Location) -> Result<ByteStream, StorageError> {
        let (bucket, key) = Self::bucket_and_key(location)?;

        let _permit = self.acquire_permit().await;
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                {
                    StorageError::NotFound(location.to_string())
                } else {
                    Self::map_sdk(err, location)
                }
            })?;

        Ok(Box::new(resp.body.into_async_read()))
    }

    async fn size(&self, location: &Location) -> Result<u64, StorageError> {
        let (bucket, key) = Self::bucket_and_key(location)?;

        let _permit = self.acquire_permit().await;
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                {
                    StorageError::NotFound(location.to_string())
                } else {
                    Self::map_sdk(err, location)
                }
            })?;

        let length = resp.content_length().unwrap_or(0);
        u64::try_from(length)
            .map_err(|_| StorageError::Backend(format!("negative content length for {location}")))
    }

    async fn write(&self, location: &Location, bytes: &[u8]) -> Result<(), StorageError> {
        let (bucket, key) = Self::bucket_and_key(location)?;

        // A single put is atomic on S3: the key either holds the old
        // object or the complete new one.
        let _permit = self.acquire_permit().await;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(SdkByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| Self::map_sdk(e, location))?;
        Ok(())
    }

    async fn exists(&self, location: &Location) -> Result<bool, StorageError> {
        match self.size(location).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
