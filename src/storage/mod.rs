//! Uniform storage access across local disk, `file://` and `s3://`.
//!
//! Every pipeline stage reads and writes through [`Storage`], which
//! classifies locations once (see [`Location`]) and dispatches to a
//! backend implementing [`StorageBackend`]. Callers never branch on the
//! backend type.

pub mod local;
pub mod location;
pub mod s3;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;

pub use local::LocalBackend;
pub use location::Location;
pub use s3::S3Backend;

use crate::config::S3Settings;

/// Boxed byte stream returned by [`StorageBackend::open`].
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Failure categories for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Artifact or referenced path is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Permission or credential failure; fatal for the storage root
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Object storage asked us to back off
    #[error("throttled by storage backend: {0}")]
    Throttled(String),

    /// Location string could not be classified or used
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure that fits no other category
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the operation might succeed. Not-found and
    /// permission failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Io(_) | Self::Backend(_))
    }
}

/// Platform artifact names filtered out of every listing so no
/// downstream component has to know about them.
const PLATFORM_ARTIFACTS: [&str; 2] = [".DS_Store", "__MACOSX"];

/// True if any `/`-separated segment of `name` is a platform artifact.
pub(crate) fn is_platform_artifact(name: &str) -> bool {
    name.split('/')
        .any(|segment| PLATFORM_ARTIFACTS.contains(&segment))
}

/// Uniform read/list/stat/write capability over one backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Recursively list the files under a directory or key prefix.
    /// Platform artifacts (`.DS_Store`, `__MACOSX` and descendants) are
    /// filtered at this layer.
    async fn list(&self, location: &Location) -> Result<Vec<Location>, StorageError>;

    /// Open a location for reading.
    async fn open(&self, location: &Location) -> Result<ByteStream, StorageError>;

    /// Byte size of the artifact at a location.
    async fn size(&self, location: &Location) -> Result<u64, StorageError>;

    /// Write a fully assembled document. Implementations must make the
    /// write atomic: readers never observe a half-written artifact.
    async fn write(&self, location: &Location, bytes: &[u8]) -> Result<(), StorageError>;

    /// Whether an artifact exists at a location.
    async fn exists(&self, location: &Location) -> Result<bool, StorageError>;
}

/// Router that owns one backend per storage realm and dispatches by
/// location classification.
///
/// The S3 client is constructed lazily on first use so purely local
/// runs never touch SDK configuration.
pub struct Storage {
    local: LocalBackend,
    s3_settings: S3Settings,
    s3: OnceCell<S3Backend>,
}

impl Storage {
    /// Create a router. `s3_settings` is only consulted if an `s3://`
    /// location is actually dereferenced.
    pub fn new(s3_settings: S3Settings) -> Self {
        Self {
            local: LocalBackend::new(),
            s3_settings,
            s3: OnceCell::new(),
        }
    }

    async fn backend(&self, location: &Location) -> Result<&dyn StorageBackend, StorageError> {
        match location {
            Location::Local(_) | Location::File(_) => Ok(&self.local),
            Location::S3 { .. } => {
                let backend = self
                    .s3
                    .get_or_try_init(|| S3Backend::connect(&self.s3_settings))
                    .await?;
                Ok(backend)
            }
        }
    }

    /// See [`StorageBackend::list`].
    pub async fn list(&self, location: &Location) -> Result<Vec<Location>, StorageError> {
        self.backend(location).await?.list(location).await
    }

    /// See [`StorageBackend::open`].
    pub async fn open(&self, location: &Location) -> Result<ByteStream, StorageError> {
        self.backend(location).await?.open(location).await
    }

    /// Read an artifact fully into memory. Documents are small; media
    /// assets should go through [`Storage::open`] instead.
    pub async fn read(&self, location: &Location) -> Result<Vec<u8>, StorageError> {
        use tokio::io::AsyncReadExt;

        let mut reader = self.open(location).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// See [`StorageBackend::size`].
    pub async fn size(&self, location: &Location) -> Result<u64, StorageError> {
        self.backend(location).await?.size(location).await
    }

    /// See [`StorageBackend::write`].
    pub async fn write(&self, location: &Location, bytes: &[u8]) -> Result<(), StorageError> {
        self.backend(location).await?.write(location, bytes).await
    }

    /// See [`StorageBackend::exists`].
    pub async fn exists(&self, location: &Location) -> Result<bool, StorageError> {
        self.backend(location).await?.exists(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_artifacts_are_detected_in_any_segment() {
        assert!(is_platform_artifact(".DS_Store"));
        assert!(is_platform_artifact("media/.DS_Store"));
        assert!(is_platform_artifact("media/__MACOSX/clip.mp4"));
        assert!(!is_platform_artifact("media/clip.mp4"));
        assert!(!is_platform_artifact("media/DS_Store.mp4"));
    }
}
