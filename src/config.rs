//! Configuration for mediadex runs.
//!
//! Configuration sources (highest priority first):
//! 1. CLI arguments
//! 2. Environment variables (MEDIADEX_*, AWS_*)
//! 3. Config file (.mediadex/config.yaml)
//! 4. Defaults (~/media_test_vectors)
//!
//! Config file discovery:
//! - Searches current directory and parents for .mediadex/config.yaml
//! - Paths in the config file are relative to the config file's parent
//!   directory
//!
//! Everything is resolved once into a [`Settings`] value that is passed
//! by argument through the pipeline; there is no ambient global state,
//! so concurrent runs with different settings never interfere.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::storage::Location;

const DEFAULT_INPUT: &str = "~/media_test_vectors";
const DEFAULT_CATALOG_FILENAME: &str = "playlist_catalog.json";
const DEFAULT_INDEX_FILENAME: &str = "catalog_index.json";
const DEFAULT_DESCRIPTION: &str = "Media test vector playlist catalog";
const DEFAULT_CREATED_BY: &str = "mediadex";
const DEFAULT_CONCURRENCY: usize = 8;
const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 30;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Input root containing the media/ subfolder (relative paths are
    /// resolved against the config file's parent directory)
    pub input: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub concurrency: Option<usize>,
    pub probe_timeout_seconds: Option<u64>,
}

/// Object-storage client settings, consulted only when an `s3://`
/// location is dereferenced.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// Resolved run settings, immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root containing `media/`; manifests and catalogs are written
    /// under the same root so relative references stay valid
    pub input_root: Location,

    /// Catalog file name at the input root
    pub catalog_filename: String,

    /// Index file name at the input root
    pub index_filename: String,

    /// Catalog description
    pub description: String,

    /// Recorded as the creator of manifests and catalogs
    pub created_by: String,

    /// Restrict the video stage to `media/<codec>`
    pub codec_filter: Option<String>,

    /// Bounded worker-pool size for per-item stages
    pub concurrency: usize,

    /// Per-probe timeout
    pub probe_timeout: Duration,

    /// Object-storage settings
    pub s3: S3Settings,
}

impl Settings {
    /// Settings with defaults for everything but the input root.
    pub fn with_input(input_root: Location) -> Self {
        Self {
            input_root,
            catalog_filename: DEFAULT_CATALOG_FILENAME.to_string(),
            index_filename: DEFAULT_INDEX_FILENAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            created_by: DEFAULT_CREATED_BY.to_string(),
            codec_filter: None,
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECONDS),
            s3: S3Settings::default(),
        }
    }

    /// Media folder for the video stage (`media/` or `media/<codec>`).
    pub fn media_root(&self) -> Location {
        match &self.codec_filter {
            Some(codec) => self.input_root.join(&format!("media/{codec}")),
            None => self.input_root.join("media"),
        }
    }

    /// Directory holding per-asset manifests and playlists.
    pub fn manifests_root(&self) -> Location {
        self.input_root.join("manifests")
    }

    /// Catalog output location.
    pub fn catalog_location(&self) -> Location {
        self.input_root.join(&self.catalog_filename)
    }

    /// Index output location.
    pub fn index_location(&self) -> Location {
        self.input_root.join(&self.index_filename)
    }
}

/// Per-invocation overrides collected from CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input_folder: Option<String>,
    pub catalog_filename: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub codec: Option<String>,
    pub concurrency: Option<usize>,
}

/// Find a config file by searching the current directory and parents.
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".mediadex").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse a config file.
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve settings from all sources. Called once at process start;
/// the result is treated as immutable for the run.
pub fn resolve(overrides: Overrides) -> Result<Settings> {
    let config_path = find_config_file();
    let config = match &config_path {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    // Input root: CLI > env > config file > default.
    let input_raw = overrides
        .input_folder
        .or_else(|| env_var("MEDIADEX_INPUT"))
        .or_else(|| {
            let configured = config.as_ref()?.paths.input.clone()?;
            // Relative config paths are anchored at the config file's
            // parent directory, not the working directory.
            let base = config_path.as_ref()?.parent()?.parent()?;
            if configured.starts_with('/') || configured.contains("://") || configured.starts_with('~')
            {
                Some(configured)
            } else {
                Some(base.join(configured).to_string_lossy().into_owned())
            }
        })
        .unwrap_or_else(|| DEFAULT_INPUT.to_string());
    let input_root = Location::parse(&input_raw)
        .with_context(|| format!("invalid input folder: {input_raw}"))?;
    // The reference algebra needs absolute bases; anchor relative
    // local inputs at the working directory once, up front.
    let input_root = match input_root {
        Location::Local(path) if !path.is_absolute() => {
            Location::Local(std::env::current_dir()?.join(path))
        }
        other => other,
    };

    let codec_filter = overrides.codec.map(|c| c.to_ascii_lowercase());

    let catalog_filename = overrides
        .catalog_filename
        .or_else(|| {
            codec_filter
                .as_ref()
                .map(|codec| format!("{codec}_playlist_catalog.json"))
        })
        .unwrap_or_else(|| DEFAULT_CATALOG_FILENAME.to_string());

    let description = overrides
        .description
        .or_else(|| {
            codec_filter
                .as_ref()
                .map(|codec| format!("Media test vector playlist catalog ({})", codec.to_uppercase()))
        })
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let created_by = overrides
        .created_by
        .or_else(|| env_var("MEDIADEX_CREATED_BY"))
        .unwrap_or_else(|| DEFAULT_CREATED_BY.to_string());

    let batch = config.as_ref().and_then(|c| c.batch.clone());
    let concurrency = overrides
        .concurrency
        .or_else(|| batch.as_ref().and_then(|b| b.concurrency))
        .unwrap_or(DEFAULT_CONCURRENCY)
        .max(1);
    let probe_timeout = Duration::from_secs(
        batch
            .and_then(|b| b.probe_timeout_seconds)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECONDS),
    );

    let storage = config.and_then(|c| c.storage);
    let s3 = S3Settings {
        region: env_var("MEDIADEX_S3_REGION")
            .or_else(|| env_var("AWS_REGION"))
            .or_else(|| storage.as_ref().and_then(|s| s.region.clone()))
            .unwrap_or_else(|| S3Settings::default().region),
        endpoint: env_var("MEDIADEX_S3_ENDPOINT")
            .or_else(|| storage.as_ref().and_then(|s| s.endpoint.clone())),
        access_key_id: env_var("AWS_ACCESS_KEY_ID")
            .or_else(|| storage.as_ref().and_then(|s| s.access_key_id.clone())),
        secret_access_key: env_var("AWS_SECRET_ACCESS_KEY")
            .or_else(|| storage.and_then(|s| s.secret_access_key)),
    };

    Ok(Settings {
        input_root,
        catalog_filename,
        index_filename: DEFAULT_INDEX_FILENAME.to_string(),
        description,
        created_by,
        codec_filter,
        concurrency,
        probe_timeout,
        s3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn derived_locations_hang_off_the_input_root() {
        let settings = Settings::with_input(Location::Local(PathBuf::from("/vectors")));
        assert_eq!(settings.media_root(), Location::Local(PathBuf::from("/vectors/media")));
        assert_eq!(
            settings.manifests_root(),
            Location::Local(PathBuf::from("/vectors/manifests"))
        );
        assert_eq!(
            settings.catalog_location(),
            Location::Local(PathBuf::from("/vectors/playlist_catalog.json"))
        );
    }

    #[test]
    fn codec_filter_narrows_the_media_root() {
        let mut settings = Settings::with_input(Location::Local(PathBuf::from("/vectors")));
        settings.codec_filter = Some("av1".to_string());
        assert_eq!(
            settings.media_root(),
            Location::Local(PathBuf::from("/vectors/media/av1"))
        );
    }
}
