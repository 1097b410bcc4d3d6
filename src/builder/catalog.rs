//! Catalog stage: aggregate playlists into one catalog document.
//!
//! Playlist references are sorted lexicographically so the output is
//! deterministic across runs, filesystems and worker completion order.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use glob::Pattern;
use thiserror::Error;
use tracing::{info, instrument};

use super::{discover, fold_outcomes, run_bounded, ItemOutcome, StageSummary};
use crate::config::Settings;
use crate::manifest::{Catalog, Playlist, FORMAT_VERSION, PLAYLIST_SUFFIX};
use crate::paths;
use crate::storage::{Location, Storage, StorageError};

/// Raised when the catalog stage finds no playlists; an empty catalog
/// is never silently written.
#[derive(Debug, Error)]
#[error("no playlists found under {manifests_root}")]
pub struct EmptyCatalogError {
    pub manifests_root: String,
}

/// Build the catalog from every playlist under the manifests root.
#[instrument(skip_all, fields(catalog = %settings.catalog_location()))]
pub async fn build(storage: Arc<Storage>, settings: &Settings) -> Result<StageSummary> {
    let manifests_root = settings.manifests_root();
    let pattern = Pattern::new(&format!("*{PLAYLIST_SUFFIX}")).context("invalid playlist pattern")?;

    let playlists = match discover(&storage, &manifests_root, &pattern, false).await {
        Ok(playlists) => playlists,
        // A missing manifests folder means zero playlists, not a
        // distinct failure mode.
        Err(StorageError::NotFound(_)) => Vec::new(),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("cannot list manifests folder {manifests_root}")))
        }
    };

    let input_root = settings.input_root.clone();
    let reader = storage.clone();
    let outcomes = run_bounded(playlists, settings.concurrency, move |playlist| {
        let storage = reader.clone();
        let input_root = input_root.clone();
        async move { verify_one(storage, input_root, playlist).await }
    })
    .await?;

    let (mut summary, values) = fold_outcomes("catalog", outcomes);

    let mut playlist_refs: Vec<String> = values.into_iter().map(|(_, reference)| reference).collect();
    playlist_refs.sort();
    playlist_refs.dedup();

    if playlist_refs.is_empty() {
        return Err(EmptyCatalogError {
            manifests_root: manifests_root.to_string(),
        }
        .into());
    }

    let catalog = Catalog {
        format_version: FORMAT_VERSION,
        description: settings.description.clone(),
        created_by: settings.created_by.clone(),
        created_at: Utc::now(),
        playlist_refs,
    };
    let location = settings.catalog_location();
    storage
        .write(&location, &catalog.to_json_vec()?)
        .await
        .with_context(|| format!("cannot write catalog {location}"))?;

    info!(catalog = %location, playlists = catalog.playlist_refs.len(), "wrote catalog");
    summary.succeeded.push(settings.catalog_filename.clone());
    Ok(summary)
}

/// Check one playlist parses and compute its catalog-relative
/// reference.
async fn verify_one(
    storage: Arc<Storage>,
    input_root: Location,
    playlist_location: Location,
) -> ItemOutcome<String> {
    let item = match playlist_location.file_name() {
        Some(name) => name.to_string(),
        None => {
            return ItemOutcome::Failed {
                item: playlist_location.to_string(),
                error: "playlist has no file name".to_string(),
            }
        }
    };

    let bytes = match storage.read(&playlist_location).await {
        Ok(bytes) => bytes,
        Err(StorageError::AccessDenied(reason)) => {
            return ItemOutcome::Fatal {
                error: anyhow::anyhow!("access denied: {reason}"),
            }
        }
        Err(e) => {
            return ItemOutcome::Failed {
                item,
                error: e.to_string(),
            }
        }
    };
    if let Err(e) = Playlist::from_json(&bytes) {
        return ItemOutcome::Failed {
            item,
            error: format!("unparseable playlist: {e}"),
        };
    }

    match paths::relativize(&input_root, &playlist_location) {
        Ok(reference) => ItemOutcome::Done {
            item,
            value: reference,
        },
        Err(e) => ItemOutcome::Failed {
            item,
            error: e.to_string(),
        },
    }
}
