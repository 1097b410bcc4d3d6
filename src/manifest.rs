//! Document types for the four pipeline stages.
//!
//! Each document is a plain record plus pure serialization helpers;
//! no I/O lives here, so the data model is testable without touching
//! storage. All references inside documents are relative (see
//! [`crate::paths`]).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::checksum;

/// Single manifest format; no schema evolution.
pub const FORMAT_VERSION: u32 = 1;

/// Suffix of per-asset video manifest files.
pub const VIDEO_MANIFEST_SUFFIX: &str = "_video_manifest.json";

/// Suffix of per-manifest playlist files.
pub const PLAYLIST_SUFFIX: &str = "_playlist.json";

/// Suffix by which catalogs are discovered at the output root.
pub const CATALOG_SUFFIX: &str = "_catalog.json";

/// Video codec label recorded in manifests.
///
/// Unknown codec identifiers are not an error; assets are labeled
/// `Unknown` and processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    #[serde(rename = "AV1")]
    Av1,
    #[serde(rename = "VP9")]
    Vp9,
    #[serde(rename = "VVC")]
    Vvc,
    Unknown,
}

impl Codec {
    /// Map a probe-reported codec identifier to a label.
    pub fn from_probe_id(id: &str) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "av1" => Self::Av1,
            "vp9" => Self::Vp9,
            "vvc" | "h266" => Self::Vvc,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Av1 => "AV1",
            Self::Vp9 => "VP9",
            Self::Vvc => "VVC",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rational frame rate, serialized as `"num/den"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self {
            num,
            den: den.max(1),
        }
    }

    /// Frames per second as a float, for display purposes.
    pub fn fps(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Compact fps rendering used in asset titles: `30`, `29.97`.
    pub fn fps_label(&self) -> String {
        if self.den == 1 {
            return self.num.to_string();
        }
        let rendered = format!("{:.2}", self.fps());
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| format!("invalid frame rate `{s}`"))
        };
        match s.split_once('/') {
            Some((num, den)) => Ok(Self::new(parse(num)?, parse(den)?)),
            None => Ok(Self::new(parse(s)?, 1)),
        }
    }
}

impl Serialize for FrameRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Per-asset manifest, one per media file, colocated under the
/// manifests root as `<asset>_video_manifest.json`. Immutable once
/// written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoManifest {
    /// Manifest format version
    pub format_version: u32,

    /// Descriptive title derived from codec/resolution/frame rate
    pub title: String,

    /// Who produced the manifest
    pub created_by: String,

    /// Asset path relative to this manifest's directory
    pub asset_path: String,

    /// Codec label
    pub codec: Codec,

    /// Container format reported by the prober
    pub container: String,

    /// Resolution
    pub width: u32,
    pub height: u32,

    /// Duration in seconds
    pub duration_seconds: f64,

    /// Rational frame rate
    pub frame_rate: FrameRate,

    /// Bit rate in bits per second, when the prober reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,

    /// SHA-256 of the asset's exact bytes at build time
    pub checksum_sha256: String,

    /// Asset size in bytes
    pub size_bytes: u64,
}

impl VideoManifest {
    /// Manifest file name for an asset file name.
    pub fn file_name_for(asset_name: &str) -> String {
        format!("{asset_name}{VIDEO_MANIFEST_SUFFIX}")
    }

    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Wrapper around one or more video manifests.
///
/// The reference list is ordered and multi-entry capable even though
/// the current playlist stage emits exactly one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    /// Manifest format version
    pub format_version: u32,

    /// References to video manifests, relative to this playlist
    pub manifest_refs: Vec<String>,

    /// Self-checksum over the canonical serialization, with the
    /// checksum and timestamp fields excluded (see [`checksum`])
    pub checksum_sha256: String,

    /// Creation time; excluded from equality/idempotence checks
    pub created_at: DateTime<Utc>,
}

impl Playlist {
    /// Assemble a playlist and compute its self-checksum.
    pub fn new(manifest_refs: Vec<String>) -> serde_json::Result<Self> {
        let mut playlist = Self {
            format_version: FORMAT_VERSION,
            manifest_refs,
            checksum_sha256: String::new(),
            created_at: Utc::now(),
        };
        playlist.checksum_sha256 = checksum::hash_document(&playlist)?;
        Ok(playlist)
    }

    /// Playlist file name for an asset file name.
    pub fn file_name_for(asset_name: &str) -> String {
        format!("{asset_name}{PLAYLIST_SUFFIX}")
    }

    /// Recompute the self-checksum from current content.
    pub fn expected_checksum(&self) -> serde_json::Result<String> {
        checksum::hash_document(self)
    }

    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Ordered aggregation of playlists with descriptive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Manifest format version
    pub format_version: u32,

    /// Human-readable catalog description
    pub description: String,

    /// Who produced the catalog
    pub created_by: String,

    /// Creation time; excluded from equality/idempotence checks
    pub created_at: DateTime<Utc>,

    /// References to playlists, relative to this catalog, sorted
    /// lexicographically and free of duplicates
    pub playlist_refs: Vec<String>,
}

impl Catalog {
    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Top-level pointer to one or more catalogs under a storage root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Manifest format version
    pub format_version: u32,

    /// References to catalogs
    pub catalog_refs: Vec<String>,

    /// Creation time; excluded from equality/idempotence checks
    pub created_at: DateTime<Utc>,
}

impl Index {
    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_lookup_matches_probe_identifiers() {
        assert_eq!(Codec::from_probe_id("av1"), Codec::Av1);
        assert_eq!(Codec::from_probe_id("AV1"), Codec::Av1);
        assert_eq!(Codec::from_probe_id("vp9"), Codec::Vp9);
        assert_eq!(Codec::from_probe_id("vvc"), Codec::Vvc);
        assert_eq!(Codec::from_probe_id("h266"), Codec::Vvc);
        assert_eq!(Codec::from_probe_id("h264"), Codec::Unknown);
    }

    #[test]
    fn codec_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Codec::Av1).unwrap(), "\"AV1\"");
        assert_eq!(serde_json::to_string(&Codec::Unknown).unwrap(), "\"Unknown\"");
    }

    #[test]
    fn frame_rate_round_trips_through_json() {
        let rate = FrameRate::new(30000, 1001);
        let json = serde_json::to_string(&rate).unwrap();
        assert_eq!(json, "\"30000/1001\"");
        assert_eq!(serde_json::from_str::<FrameRate>(&json).unwrap(), rate);
    }

    #[test]
    fn frame_rate_parses_bare_integers() {
        assert_eq!("30".parse::<FrameRate>().unwrap(), FrameRate::new(30, 1));
    }

    #[test]
    fn fps_label_trims_trailing_zeros() {
        assert_eq!(FrameRate::new(30, 1).fps_label(), "30");
        assert_eq!(FrameRate::new(30000, 1001).fps_label(), "29.97");
        assert_eq!(FrameRate::new(25, 2).fps_label(), "12.5");
    }

    #[test]
    fn playlist_checksum_is_stable_across_creation_times() {
        let a = Playlist::new(vec!["clip.mp4_video_manifest.json".to_string()]).unwrap();
        let b = Playlist::new(vec!["clip.mp4_video_manifest.json".to_string()]).unwrap();
        assert_eq!(a.checksum_sha256, b.checksum_sha256);
        assert_eq!(a.expected_checksum().unwrap(), a.checksum_sha256);
    }

    #[test]
    fn playlist_checksum_tracks_reference_changes() {
        let a = Playlist::new(vec!["a_video_manifest.json".to_string()]).unwrap();
        let b = Playlist::new(vec!["b_video_manifest.json".to_string()]).unwrap();
        assert_ne!(a.checksum_sha256, b.checksum_sha256);
    }
}
