//! Validator Integration Tests
//!
//! Publishes a small catalog tree, then checks that the validator
//! passes untouched trees and pinpoints tampering, missing artifacts
//! and unresolvable references.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use mediadex::adapters::{MediaProber, ProbeError, ProbeReport};
use mediadex::builder::{catalog, index, playlist, video};
use mediadex::config::{S3Settings, Settings};
use mediadex::manifest::{FrameRate, Playlist};
use mediadex::storage::{Location, Storage};
use mediadex::validate::{CheckOutcome, Validator};

struct StubProber;

#[async_trait]
impl MediaProber for StubProber {
    fn name(&self) -> &str {
        "stub"
    }

    async fn probe(&self, _path: &Path) -> Result<ProbeReport, ProbeError> {
        Ok(ProbeReport {
            codec_id: "av1".to_string(),
            container: "mp4".to_string(),
            width: 1280,
            height: 720,
            duration_seconds: 1.5,
            frame_rate: FrameRate::new(30, 1),
            bit_rate: None,
        })
    }
}

fn storage() -> Arc<Storage> {
    Arc::new(Storage::new(S3Settings::default()))
}

/// Build the full pipeline over the given assets and return the
/// settings used.
async fn publish(root: &Path, names: &[&str]) -> Settings {
    let media = root.join("media");
    std::fs::create_dir_all(&media).unwrap();
    for name in names {
        std::fs::write(media.join(name), name.as_bytes()).unwrap();
    }

    let settings = Settings::with_input(Location::Local(root.to_path_buf()));
    let prober: Arc<dyn MediaProber> = Arc::new(StubProber);
    video::build(storage(), prober, &settings).await.unwrap();
    playlist::build(storage(), &settings).await.unwrap();
    catalog::build(storage(), &settings).await.unwrap();
    index::build(storage(), &settings, &[]).await.unwrap();
    settings
}

#[tokio::test]
async fn untouched_tree_passes_from_the_index_down() {
    let dir = TempDir::new().unwrap();
    let settings = publish(dir.path(), &["a.mp4", "b.mp4"]).await;

    let report = Validator::new(storage())
        .validate(&settings.index_location())
        .await
        .unwrap();

    assert!(report.passed(), "unexpected failures: {report}");
    // Catalog, two playlists, two manifests and two assets all get a
    // record.
    assert!(report.records.len() >= 7);
}

#[tokio::test]
async fn tampered_asset_yields_exactly_one_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let settings = publish(dir.path(), &["a.mp4", "b.mp4", "c.mp4"]).await;

    // Modify one asset's bytes after its manifest was built.
    std::fs::write(dir.path().join("media/b.mp4"), b"tampered bytes").unwrap();

    let report = Validator::new(storage())
        .validate(&settings.catalog_location())
        .await
        .unwrap();

    let mismatches: Vec<_> = report
        .records
        .iter()
        .filter(|r| matches!(r.outcome, CheckOutcome::ChecksumMismatch { .. }))
        .collect();
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].entity.ends_with("media/b.mp4"));

    // Everything else still passes.
    assert_eq!(report.failures().count(), 1);
}

#[tokio::test]
async fn deleted_manifest_is_reported_missing() {
    let dir = TempDir::new().unwrap();
    let settings = publish(dir.path(), &["a.mp4"]).await;

    std::fs::remove_file(dir.path().join("manifests/a.mp4_video_manifest.json")).unwrap();

    let report = Validator::new(storage())
        .validate(&settings.catalog_location())
        .await
        .unwrap();

    assert!(!report.passed());
    assert!(report
        .records
        .iter()
        .any(|r| r.outcome == CheckOutcome::MissingArtifact
            && r.entity == "a.mp4_video_manifest.json"));
}

#[tokio::test]
async fn deleted_asset_is_reported_missing() {
    let dir = TempDir::new().unwrap();
    let settings = publish(dir.path(), &["a.mp4", "b.mp4"]).await;

    std::fs::remove_file(dir.path().join("media/a.mp4")).unwrap();

    let report = Validator::new(storage())
        .validate(&settings.index_location())
        .await
        .unwrap();

    let missing: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.outcome == CheckOutcome::MissingArtifact)
        .collect();
    assert_eq!(missing.len(), 1);
    assert!(missing[0].entity.ends_with("media/a.mp4"));
}

#[tokio::test]
async fn reference_escaping_the_root_is_unresolvable() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("manifests")).unwrap();

    // Hand-write a playlist whose reference climbs far above any root.
    let escape = format!("{}nowhere.json", "../".repeat(64));
    let rogue = Playlist::new(vec![escape]).unwrap();
    let path = dir.path().join("manifests/rogue_playlist.json");
    std::fs::write(&path, rogue.to_json_vec().unwrap()).unwrap();

    let report = Validator::new(storage())
        .validate(&Location::Local(path))
        .await
        .unwrap();

    assert!(report
        .records
        .iter()
        .any(|r| matches!(r.outcome, CheckOutcome::UnresolvableReference { .. })));
}

#[tokio::test]
async fn validator_never_mutates_artifacts() {
    let dir = TempDir::new().unwrap();
    let settings = publish(dir.path(), &["a.mp4"]).await;

    let catalog_before = std::fs::read(dir.path().join("playlist_catalog.json")).unwrap();
    let manifest_before =
        std::fs::read(dir.path().join("manifests/a.mp4_video_manifest.json")).unwrap();

    Validator::new(storage())
        .validate(&settings.index_location())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("playlist_catalog.json")).unwrap(),
        catalog_before
    );
    assert_eq!(
        std::fs::read(dir.path().join("manifests/a.mp4_video_manifest.json")).unwrap(),
        manifest_before
    );
}
