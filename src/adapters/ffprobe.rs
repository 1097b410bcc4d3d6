//! ffprobe adapter for media probing.
//!
//! Spawns `ffprobe -print_format json` and parses the structured
//! output, with a timeout so a wedged probe cannot stall a batch.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use super::{MediaProber, ProbeError, ProbeReport};
use crate::manifest::FrameRate;

/// Media prober backed by the `ffprobe` binary.
pub struct FfprobeProber {
    /// Path to the ffprobe binary (default: "ffprobe")
    binary_path: String,

    /// Per-probe timeout
    probe_timeout: Duration,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl FfprobeProber {
    /// Create a prober using `ffprobe` from `$PATH`.
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            binary_path: "ffprobe".to_string(),
            probe_timeout,
        }
    }

    /// Create a prober with a custom binary path.
    pub fn with_binary_path(binary_path: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_timeout,
        }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let child = Command::new(&self.binary_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProbeError::Process(format!("failed to spawn {}: {e}", self.binary_path)))?;

        let output = timeout(self.probe_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ProbeError::Process(format!(
                    "probe of {} timed out after {:?}",
                    path.display(),
                    self.probe_timeout
                ))
            })?
            .map_err(|e| ProbeError::Process(format!("failed to wait for probe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Unprobeable(format!(
                "{}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Unprobeable(format!("{}: {e}", path.display())))?;
        parsed.into_report(path)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

impl FfprobeOutput {
    fn into_report(self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let unprobeable =
            |what: &str| ProbeError::Unprobeable(format!("{}: no {what}", path.display()));

        let stream = self
            .streams
            .into_iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| unprobeable("video stream"))?;

        let codec_id = stream.codec_name.ok_or_else(|| unprobeable("codec name"))?;
        let width = stream.width.ok_or_else(|| unprobeable("width"))?;
        let height = stream.height.ok_or_else(|| unprobeable("height"))?;

        let frame_rate = stream
            .r_frame_rate
            .as_deref()
            .and_then(|r| r.parse::<FrameRate>().ok())
            .filter(|r| r.num > 0)
            .ok_or_else(|| unprobeable("frame rate"))?;

        // Stream duration is more precise when present; fall back to
        // the container-level value.
        let duration_seconds = stream
            .duration
            .as_deref()
            .or(self.format.as_ref().and_then(|f| f.duration.as_deref()))
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| unprobeable("duration"))?;

        let container = self
            .format
            .as_ref()
            .and_then(|f| f.format_name.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let bit_rate = self
            .format
            .as_ref()
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.parse::<u64>().ok());

        Ok(ProbeReport {
            codec_id,
            container,
            width,
            height,
            duration_seconds,
            frame_rate,
            bit_rate,
        })
    }
}
