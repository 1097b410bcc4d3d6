//! Pipeline Integration Tests
//!
//! End-to-end runs of the builder stages against a temporary media
//! tree, with a stub prober so no external tooling is required.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use mediadex::adapters::{MediaProber, ProbeError, ProbeReport};
use mediadex::builder::{catalog, index, playlist, video};
use mediadex::config::{S3Settings, Settings};
use mediadex::manifest::{FrameRate, Playlist, VideoManifest};
use mediadex::storage::{Location, Storage};
use mediadex::EmptyCatalogError;

/// Prober that derives metadata from the file name. Files containing
/// "corrupt" fail to probe.
struct StubProber;

#[async_trait]
impl MediaProber for StubProber {
    fn name(&self) -> &str {
        "stub"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.contains("corrupt") {
            return Err(ProbeError::Unprobeable(format!(
                "{}: stub cannot parse",
                path.display()
            )));
        }

        let codec_id = if name.contains("vp9") {
            "vp9"
        } else if name.contains("mystery") {
            "h264"
        } else {
            "av1"
        };
        Ok(ProbeReport {
            codec_id: codec_id.to_string(),
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            width: 1920,
            height: 1080,
            duration_seconds: 2.0,
            frame_rate: FrameRate::new(30, 1),
            bit_rate: Some(1_000_000),
        })
    }
}

fn settings_for(root: &Path) -> Settings {
    Settings::with_input(Location::Local(root.to_path_buf()))
}

fn storage() -> Arc<Storage> {
    Arc::new(Storage::new(S3Settings::default()))
}

fn prober() -> Arc<dyn MediaProber> {
    Arc::new(StubProber)
}

/// Create media files whose bytes are their own names.
fn seed_media(root: &Path, names: &[&str]) {
    let media = root.join("media");
    std::fs::create_dir_all(&media).unwrap();
    for name in names {
        std::fs::write(media.join(name), name.as_bytes()).unwrap();
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn video_stage_isolates_unprobeable_assets() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &["a.mp4", "b.mp4", "c.mp4", "corrupt.mp4"]);
    let settings = settings_for(dir.path());

    let summary = video::build(storage(), prober(), &settings).await.unwrap();

    assert_eq!(summary.succeeded.len(), 3);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].0, "corrupt.mp4");
    assert!(summary.is_success(), "skips must not fail the batch");

    let manifests: Vec<_> = std::fs::read_dir(dir.path().join("manifests"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("_video_manifest.json"))
        .collect();
    assert_eq!(manifests.len(), 3);
}

#[tokio::test]
async fn manifests_record_codec_labels_and_relative_paths() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &["clip.mp4", "mystery.mp4"]);
    let settings = settings_for(dir.path());

    video::build(storage(), prober(), &settings).await.unwrap();

    let known = read_json(&dir.path().join("manifests/clip.mp4_video_manifest.json"));
    assert_eq!(known["codec"], "AV1");
    assert_eq!(known["asset_path"], "../media/clip.mp4");
    assert_eq!(known["format_version"], 1);
    assert_eq!(known["frame_rate"], "30/1");
    assert_eq!(known["size_bytes"], "clip.mp4".len() as u64);

    let unknown = read_json(&dir.path().join("manifests/mystery.mp4_video_manifest.json"));
    assert_eq!(unknown["codec"], "Unknown");
}

#[tokio::test]
async fn playlists_wrap_one_manifest_with_a_stable_checksum() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &["clip.mp4"]);
    let settings = settings_for(dir.path());

    video::build(storage(), prober(), &settings).await.unwrap();
    let summary = playlist::build(storage(), &settings).await.unwrap();
    assert_eq!(summary.succeeded.len(), 1);

    let path = dir.path().join("manifests/clip.mp4_playlist.json");
    let wrapped = Playlist::from_json(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(wrapped.manifest_refs, vec!["clip.mp4_video_manifest.json"]);
    assert_eq!(wrapped.expected_checksum().unwrap(), wrapped.checksum_sha256);
}

#[tokio::test]
async fn rerunning_the_pipeline_is_idempotent_modulo_timestamps() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &["a.mp4", "b.mp4"]);
    let settings = settings_for(dir.path());

    let run = |settings: Settings| async move {
        video::build(storage(), prober(), &settings).await.unwrap();
        playlist::build(storage(), &settings).await.unwrap();
        catalog::build(storage(), &settings).await.unwrap();
    };
    run(settings.clone()).await;

    let manifest_path = dir.path().join("manifests/a.mp4_video_manifest.json");
    let playlist_path = dir.path().join("manifests/a.mp4_playlist.json");
    let catalog_path = dir.path().join("playlist_catalog.json");

    let first_manifest = std::fs::read(&manifest_path).unwrap();
    let first_playlist = read_json(&playlist_path);
    let first_catalog = read_json(&catalog_path);

    run(settings).await;

    // Video manifests carry no timestamp and must be byte-identical.
    assert_eq!(std::fs::read(&manifest_path).unwrap(), first_manifest);

    // Playlists and catalogs vary only in created_at.
    let strip = |mut value: serde_json::Value| {
        value.as_object_mut().unwrap().remove("created_at");
        value
    };
    assert_eq!(strip(read_json(&playlist_path)), strip(first_playlist));
    assert_eq!(strip(read_json(&catalog_path)), strip(first_catalog));
}

#[tokio::test]
async fn catalog_orders_references_lexicographically() {
    let dir = TempDir::new().unwrap();
    // Seeded out of order; three workers may also complete out of
    // order.
    seed_media(dir.path(), &["b.mp4", "a.mp4", "c.mp4"]);
    let mut settings = settings_for(dir.path());
    settings.concurrency = 3;

    video::build(storage(), prober(), &settings).await.unwrap();
    playlist::build(storage(), &settings).await.unwrap();
    catalog::build(storage(), &settings).await.unwrap();

    let catalog = read_json(&dir.path().join("playlist_catalog.json"));
    let refs: Vec<_> = catalog["playlist_refs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        refs,
        vec![
            "manifests/a.mp4_playlist.json",
            "manifests/b.mp4_playlist.json",
            "manifests/c.mp4_playlist.json",
        ]
    );
}

#[tokio::test]
async fn catalog_stage_refuses_to_write_an_empty_catalog() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &[]);
    let settings = settings_for(dir.path());

    let error = catalog::build(storage(), &settings).await.unwrap_err();
    assert!(error.downcast_ref::<EmptyCatalogError>().is_some());
    assert!(!dir.path().join("playlist_catalog.json").exists());
}

#[tokio::test]
async fn index_references_the_catalog() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &["clip.mp4"]);
    let settings = settings_for(dir.path());

    video::build(storage(), prober(), &settings).await.unwrap();
    playlist::build(storage(), &settings).await.unwrap();
    catalog::build(storage(), &settings).await.unwrap();
    index::build(storage(), &settings, &[]).await.unwrap();

    let index_doc = read_json(&dir.path().join("catalog_index.json"));
    let refs: Vec<_> = index_doc["catalog_refs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(refs, vec!["playlist_catalog.json"]);
}

#[tokio::test]
async fn manifests_survive_a_parse_round_trip() {
    let dir = TempDir::new().unwrap();
    seed_media(dir.path(), &["clip.mp4"]);
    let settings = settings_for(dir.path());

    video::build(storage(), prober(), &settings).await.unwrap();

    let bytes = std::fs::read(dir.path().join("manifests/clip.mp4_video_manifest.json")).unwrap();
    let manifest = VideoManifest::from_json(&bytes).unwrap();
    assert_eq!(manifest.title, "av1-1920x1080p30fps");
    assert_eq!(manifest.created_by, "mediadex");
    assert_eq!(manifest.checksum_sha256.len(), 64);
}
