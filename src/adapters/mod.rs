//! Adapter interfaces for external collaborators.
//!
//! The media prober is an external tool behind a trait so the pipeline
//! (and its tests) never depend on a specific binary being installed.

pub mod ffprobe;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use ffprobe::FfprobeProber;

use crate::manifest::FrameRate;

/// Technical metadata reported by a media prober for one asset.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Codec identifier as reported by the tool (e.g. `av1`, `vp9`)
    pub codec_id: String,

    /// Container format (e.g. `mov,mp4,m4a,3gp,3g2,mj2`)
    pub container: String,

    /// Resolution
    pub width: u32,
    pub height: u32,

    /// Duration in seconds
    pub duration_seconds: f64,

    /// Rational frame rate
    pub frame_rate: FrameRate,

    /// Bit rate in bits per second, if reported
    pub bit_rate: Option<u64>,
}

/// Probe failures. Any probe failure skips the asset with a warning;
/// it never aborts the batch.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The tool ran but could not make sense of the media
    #[error("unprobeable media: {0}")]
    Unprobeable(String),

    /// The tool could not be spawned or timed out
    #[error("probe process failed: {0}")]
    Process(String),
}

/// Trait for media probers.
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Human-readable prober name
    fn name(&self) -> &str;

    /// Probe a local media file.
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;
}
