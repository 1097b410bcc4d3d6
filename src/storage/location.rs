//! Location strings and their classification.
//!
//! A location string names an artifact on one of three backends:
//! `s3://bucket/key` (object storage), `file:///path` (file scheme) or
//! anything else (local path, after `~` and environment-variable
//! expansion). Classification happens exactly once, at parse time;
//! everything downstream dispatches on the resulting [`Location`].

use std::fmt;
use std::path::{Path, PathBuf};

use super::StorageError;

/// A classified storage location.
///
/// `Local` and `File` both name filesystem paths and are served by the
/// same backend; the distinction is preserved so that references read
/// back from documents keep the scheme they were written with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Plain local path (absolute or relative to the working directory)
    Local(PathBuf),

    /// `file://` URL, stripped to its path
    File(PathBuf),

    /// Object-storage key within a bucket
    S3 { bucket: String, key: String },
}

impl Location {
    /// Classify a location string by prefix inspection.
    ///
    /// Local paths get `~` and `$VAR`/`${VAR}` expansion; URL schemes
    /// are taken verbatim.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, key) = match rest.split_once('/') {
                Some((bucket, key)) => (bucket, key.trim_start_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(StorageError::InvalidLocation(raw.to_string()));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if let Some(rest) = raw.strip_prefix("file://") {
            if rest.is_empty() {
                return Err(StorageError::InvalidLocation(raw.to_string()));
            }
            return Ok(Self::File(PathBuf::from(rest)));
        }

        let expanded = expand_vars(&expand_tilde(raw)?);
        if expanded.is_empty() {
            return Err(StorageError::InvalidLocation(raw.to_string()));
        }
        Ok(Self::Local(PathBuf::from(expanded)))
    }

    /// Append a relative child (may contain multiple `/`-separated
    /// segments) to this location.
    pub fn join(&self, child: &str) -> Self {
        match self {
            Self::Local(path) => Self::Local(path.join(child)),
            Self::File(path) => Self::File(path.join(child)),
            Self::S3 { bucket, key } => {
                let key = if key.is_empty() {
                    child.to_string()
                } else {
                    format!("{}/{}", key.trim_end_matches('/'), child)
                };
                Self::S3 {
                    bucket: bucket.clone(),
                    key,
                }
            }
        }
    }

    /// The containing directory (or key prefix) of this location.
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Local(path) => path.parent().map(|p| Self::Local(p.to_path_buf())),
            Self::File(path) => path.parent().map(|p| Self::File(p.to_path_buf())),
            Self::S3 { bucket, key } => {
                let trimmed = key.trim_end_matches('/');
                let parent = match trimmed.rsplit_once('/') {
                    Some((prefix, _)) => prefix.to_string(),
                    None if trimmed.is_empty() => return None,
                    None => String::new(),
                };
                Some(Self::S3 {
                    bucket: bucket.clone(),
                    key: parent,
                })
            }
        }
    }

    /// Final path segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Local(path) | Self::File(path) => path.file_name().and_then(|n| n.to_str()),
            Self::S3 { key, .. } => key.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty()),
        }
    }

    /// The filesystem path behind this location, for backends that
    /// have one. Object-storage locations return `None`.
    pub fn as_local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) | Self::File(path) => Some(path.as_path()),
            Self::S3 { .. } => None,
        }
    }

    /// Rebuild a location of the same classification around a new
    /// filesystem path. Used by the local backend when walking
    /// directories so that children keep their parent's scheme.
    pub(crate) fn with_path(&self, path: PathBuf) -> Self {
        match self {
            Self::Local(_) => Self::Local(path),
            Self::File(_) => Self::File(path),
            Self::S3 { .. } => Self::Local(path),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::File(path) => write!(f, "file://{}", path.display()),
            Self::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(raw: &str) -> Result<String, StorageError> {
    if raw == "~" || raw.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::InvalidLocation(raw.to_string()))?;
        return Ok(format!("{}{}", home.display(), &raw[1..]));
    }
    Ok(raw.to_string())
}

/// Expand `$VAR` and `${VAR}` references against the process
/// environment. Unset variables expand to the empty string.
fn expand_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = matches!(chars.peek(), Some((_, '{')));
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&(_, nc)) = chars.peek() {
            let done = if braced {
                nc == '}'
            } else {
                !(nc.is_ascii_alphanumeric() || nc == '_')
            };
            if done {
                break;
            }
            name.push(nc);
            chars.next();
        }
        if braced {
            chars.next(); // consume '}'
        }
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&std::env::var(&name).unwrap_or_default());
        }
    }

    out
}
