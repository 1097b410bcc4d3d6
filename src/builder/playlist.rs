//! Playlist stage: one playlist per video manifest.
//!
//! Rerunning over unchanged manifests reproduces byte-identical
//! playlists apart from `created_at` — the self-checksum excludes the
//! timestamp, so even the checksum is stable.

use std::sync::Arc;

use anyhow::{Context, Result};
use glob::Pattern;
use tracing::{info, instrument};

use super::{discover, fold_outcomes, run_bounded, ItemOutcome, StageSummary};
use crate::config::Settings;
use crate::manifest::{Playlist, VideoManifest, VIDEO_MANIFEST_SUFFIX};
use crate::storage::{Location, Storage, StorageError};

/// Build a playlist wrapping each video manifest under the manifests
/// root.
#[instrument(skip_all, fields(manifests_root = %settings.manifests_root()))]
pub async fn build(storage: Arc<Storage>, settings: &Settings) -> Result<StageSummary> {
    let manifests_root = settings.manifests_root();
    let pattern = Pattern::new(&format!("*{VIDEO_MANIFEST_SUFFIX}"))
        .context("invalid manifest pattern")?;

    let manifests = discover(&storage, &manifests_root, &pattern, false)
        .await
        .with_context(|| format!("cannot list manifests folder {manifests_root}"))?;
    info!(count = manifests.len(), "found video manifests");

    let outcomes = run_bounded(manifests, settings.concurrency, move |manifest| {
        let storage = storage.clone();
        async move { build_one(storage, manifest).await }
    })
    .await?;

    let (summary, _) = fold_outcomes("playlist", outcomes);
    Ok(summary)
}

/// Wrap one manifest. Returns the playlist file name.
async fn build_one(storage: Arc<Storage>, manifest_location: Location) -> ItemOutcome<String> {
    let item = match manifest_location.file_name() {
        Some(name) => name.to_string(),
        None => {
            return ItemOutcome::Failed {
                item: manifest_location.to_string(),
                error: "manifest has no file name".to_string(),
            }
        }
    };

    // Read the manifest back to confirm the reference actually leads
    // to a well-formed document before wrapping it.
    let bytes = match storage.read(&manifest_location).await {
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
    if let Err(e) = VideoManifest::from_json(&bytes) {
        return ItemOutcome::Failed {
            item,
            error: format!("unparseable video manifest: {e}"),
        };
    }

    // The playlist sits next to the manifest, so the reference is just
    // the manifest file name.
    let Some(asset_name) = item.strip_suffix(VIDEO_MANIFEST_SUFFIX) else {
        return ItemOutcome::Failed {
            item: item.clone(),
            error: "unexpected manifest file name".to_string(),
        };
    };
    let playlist_name = Playlist::file_name_for(asset_name);

    let playlist = match Playlist::new(vec![item.clone()]) {
        Ok(playlist) => playlist,
        Err(e) => {
            return ItemOutcome::Failed {
                item,
                error: format!("checksum failed: {e}"),
            }
        }
    };
    let bytes = match playlist.to_json_vec() {
        Ok(bytes) => bytes,
        Err(e) => {
            return ItemOutcome::Failed {
                item,
                error: format!("serialization failed: {e}"),
            }
        }
    };

    let playlist_location = match manifest_location.parent() {
        Some(parent) => parent.join(&playlist_name),
        None => {
            return ItemOutcome::Failed {
                item,
                error: "manifest has no parent directory".to_string(),
            }
        }
    };
    if let Err(e) = storage.write(&playlist_location, &bytes).await {
        return ItemOutcome::Failed {
            item,
            error: e.to_string(),
        };
    }

    info!(playlist = %playlist_name, "wrote playlist");
    ItemOutcome::Done {
        item,
        value: playlist_name,
    }
}
