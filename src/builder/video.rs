//! Video stage: one manifest per media asset.
//!
//! Walks the media folder, probes each asset, computes its content
//! checksum and writes a `*_video_manifest.json` next to its peers
//! under the manifests root. One bad asset never aborts the batch.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, instrument};

use super::{fold_outcomes, run_bounded, ItemOutcome, StageSummary};
use crate::adapters::{MediaProber, ProbeReport};
use crate::checksum;
use crate::config::Settings;
use crate::manifest::{Codec, VideoManifest, FORMAT_VERSION};
use crate::paths;
use crate::storage::{Location, Storage, StorageError};

/// Film-grain variant markers carried through into asset titles.
const FILM_GRAIN_SUFFIXES: [&str; 3] = ["fd0", "fd1", "fd2"];

/// Build a video manifest for every asset under the media root.
#[instrument(skip_all, fields(media_root = %settings.media_root()))]
pub async fn build(
    storage: Arc<Storage>,
    prober: Arc<dyn MediaProber>,
    settings: &Settings,
) -> Result<StageSummary> {
    let media_root = settings.media_root();
    if media_root.as_local_path().is_none() {
        // The prober is a local-path collaborator; remote roots cannot
        // be probed.
        return Err(anyhow!(
            "the video stage requires a local input root, got {media_root}"
        ));
    }

    let assets = storage
        .list(&media_root)
        .await
        .with_context(|| format!("cannot list media folder {media_root}"))?;
    info!(count = assets.len(), "found media assets");

    let manifests_root = settings.manifests_root();
    let created_by = settings.created_by.clone();
    let outcomes = run_bounded(assets, settings.concurrency, move |asset| {
        let storage = storage.clone();
        let prober = prober.clone();
        let manifests_root = manifests_root.clone();
        let created_by = created_by.clone();
        async move { build_one(storage, prober, manifests_root, created_by, asset).await }
    })
    .await?;

    let (summary, _) = fold_outcomes("video", outcomes);
    Ok(summary)
}

/// Process a single asset. Returns the manifest file name on success.
async fn build_one(
    storage: Arc<Storage>,
    prober: Arc<dyn MediaProber>,
    manifests_root: Location,
    created_by: String,
    asset: Location,
) -> ItemOutcome<String> {
    let item = match asset.file_name() {
        Some(name) => name.to_string(),
        None => {
            return ItemOutcome::Failed {
                item: asset.to_string(),
                error: "asset has no file name".to_string(),
            }
        }
    };

    let Some(path) = asset.as_local_path() else {
        return ItemOutcome::Failed {
            item,
            error: format!("cannot probe non-local asset {asset}"),
        };
    };

    // Probing failure skips the asset; the rest of the batch continues.
    let report = match prober.probe(path).await {
        Ok(report) => report,
        Err(e) => {
            return ItemOutcome::Skipped {
                item,
                reason: e.to_string(),
            }
        }
    };

    let checksum_sha256 = match storage.open(&asset).await {
        Ok(reader) => match checksum::hash_reader(reader).await {
            Ok(digest) => digest,
            Err(e) => {
                return ItemOutcome::Failed {
                    item,
                    error: format!("checksum failed: {e}"),
                }
            }
        },
        Err(e) => return storage_outcome(item, &asset, e),
    };

    let size_bytes = match storage.size(&asset).await {
        Ok(size) => size,
        Err(e) => return storage_outcome(item, &asset, e),
    };

    // Manifests must never embed absolute paths; an asset that cannot
    // be expressed relative to the manifests root fails on its own.
    let asset_path = match paths::relativize(&manifests_root, &asset) {
        Ok(reference) => reference,
        Err(e) => {
            return ItemOutcome::Failed {
                item,
                error: e.to_string(),
            }
        }
    };

    let codec = Codec::from_probe_id(&report.codec_id);
    let manifest = VideoManifest {
        format_version: FORMAT_VERSION,
        title: asset_title(&item, codec, &report),
        created_by,
        asset_path,
        codec,
        container: report.container,
        width: report.width,
        height: report.height,
        duration_seconds: report.duration_seconds,
        frame_rate: report.frame_rate,
        bit_rate: report.bit_rate,
        checksum_sha256,
        size_bytes,
    };

    let manifest_name = VideoManifest::file_name_for(&item);
    let manifest_location = manifests_root.join(&manifest_name);
    let bytes = match manifest.to_json_vec() {
        Ok(bytes) => bytes,
        Err(e) => {
            return ItemOutcome::Failed {
                item,
                error: format!("serialization failed: {e}"),
            }
        }
    };
    if let Err(e) = storage.write(&manifest_location, &bytes).await {
        return storage_outcome(item, &manifest_location, e);
    }

    info!(manifest = %manifest_name, "wrote video manifest");
    ItemOutcome::Done {
        item,
        value: manifest_name,
    }
}

/// Storage failures are per-item except access denial, which is fatal
/// for the whole storage root.
fn storage_outcome<R>(item: String, location: &Location, error: StorageError) -> ItemOutcome<R> {
    match error {
        StorageError::AccessDenied(_) => ItemOutcome::Fatal {
            error: anyhow::Error::new(error).context(format!("while accessing {location}")),
        },
        other => ItemOutcome::Failed {
            item,
            error: other.to_string(),
        },
    }
}

/// Descriptive title: `av1-1920x1080p29.97fps`, with a film-grain
/// suffix when the asset name carries one. Unknown codecs fall back to
/// the asset file name.
fn asset_title(file_name: &str, codec: Codec, report: &ProbeReport) -> String {
    let mut title = match codec {
        Codec::Unknown => file_name.to_string(),
        labeled => format!(
            "{}-{}x{}p{}fps",
            labeled.label().to_ascii_lowercase(),
            report.width,
            report.height,
            report.frame_rate.fps_label()
        ),
    };
    for grain in FILM_GRAIN_SUFFIXES {
        if file_name.contains(grain) {
            title.push('-');
            title.push_str(grain);
            break;
        }
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FrameRate;

    fn report(width: u32, height: u32, num: u32, den: u32) -> ProbeReport {
        ProbeReport {
            codec_id: "av1".to_string(),
            container: "mp4".to_string(),
            width,
            height,
            duration_seconds: 1.0,
            frame_rate: FrameRate::new(num, den),
            bit_rate: None,
        }
    }

    #[test]
    fn titles_encode_codec_resolution_and_fps() {
        let title = asset_title("clip.mp4", Codec::Av1, &report(1920, 1080, 30000, 1001));
        assert_eq!(title, "av1-1920x1080p29.97fps");
    }

    #[test]
    fn titles_carry_film_grain_suffixes() {
        let title = asset_title("clip-fd1.mp4", Codec::Vp9, &report(640, 360, 30, 1));
        assert_eq!(title, "vp9-640x360p30fps-fd1");
    }

    #[test]
    fn unknown_codec_titles_fall_back_to_the_file_name() {
        let title = asset_title("mystery.bin", Codec::Unknown, &report(640, 360, 30, 1));
        assert_eq!(title, "mystery.bin");
    }
}
