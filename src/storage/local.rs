//! Local filesystem backend, also serving `file://` locations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::{is_platform_artifact, ByteStream, Location, StorageBackend, StorageError};

/// Filesystem-backed storage. Stateless; all paths come from the
/// locations passed in.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    fn path_of<'a>(location: &'a Location) -> Result<&'a Path, StorageError> {
        location
            .as_local_path()
            .ok_or_else(|| StorageError::InvalidLocation(location.to_string()))
    }

    fn map_io(err: std::io::Error, location: &Location) -> StorageError {
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound(location.to_string()),
            ErrorKind::PermissionDenied => StorageError::AccessDenied(location.to_string()),
            _ => StorageError::Io(err),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self, location: &Location) -> Result<Vec<Location>, StorageError> {
        let root = Self::path_of(location)?.to_path_buf();

        let meta = fs::metadata(&root)
            .await
            .map_err(|e| Self::map_io(e, location))?;
        if !meta.is_dir() {
            return Err(StorageError::NotFound(location.to_string()));
        }

        // Iterative walk; async recursion would need boxing.
        let mut pending: Vec<PathBuf> = vec![root];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| Self::map_io(e, location))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::map_io(e, location))?
            {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if is_platform_artifact(name) {
                    continue;
                }

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Self::map_io(e, location))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(location.with_path(entry.path()));
                }
            }
        }

        Ok(files)
    }

    async fn open(&self, location: &Location) -> Result<ByteStream, StorageError> {
        let path = Self::path_of(location)?;
        let file = fs::File::open(path)
            .await
            .map_err(|e| Self::map_io(e, location))?;
        Ok(Box::new(file))
    }

    async fn size(&self, location: &Location) -> Result<u64, StorageError> {
        let path = Self::path_of(location)?;
        let meta = fs::metadata(path)
            .await
            .map_err(|e| Self::map_io(e, location))?;
        Ok(meta.len())
    }

    async fn write(&self, location: &Location, bytes: &[u8]) -> Result<(), StorageError> {
        let path = Self::path_of(location)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidLocation(location.to_string()))?;
        let file_name = location
            .file_name()
            .ok_or_else(|| StorageError::InvalidLocation(location.to_string()))?;

        fs::create_dir_all(parent)
            .await
            .map_err(|e| Self::map_io(e, location))?;

        // Write to a uniquely named sibling, then rename into place so
        // concurrent readers never observe a half-written document.
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| Self::map_io(e, location))?;

        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Self::map_io(e, location));
        }
        Ok(())
    }

    async fn exists(&self, location: &Location) -> Result<bool, StorageError> {
        let path = Self::path_of(location)?;
        match fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_io(e, location)),
        }
    }
}
