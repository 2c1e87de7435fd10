//! ffmpeg/ffprobe queries used for video thumbnails and segment durations.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use image::DynamicImage;
use tracing::debug;

use crate::error::ProbeError;
use crate::image_loader;
use crate::tool::ExternalTool;

/// Fixed wait for any single video probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct VideoProbe {
    ffmpeg: ExternalTool,
    ffprobe: ExternalTool,
}

impl VideoProbe {
    pub fn new(ffmpeg: &Path, ffprobe: &Path, timeout: Duration) -> Self {
        Self {
            ffmpeg: ExternalTool::new(ffmpeg, timeout),
            ffprobe: ExternalTool::new(ffprobe, timeout),
        }
    }

    /// Grab the first video frame as a still.
    pub fn first_frame(&self, path: &Path) -> Result<DynamicImage, ProbeError> {
        let png = self.ffmpeg.run([
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-nostdin"),
            OsStr::new("-i"),
            path.as_os_str(),
            OsStr::new("-frames:v"),
            OsStr::new("1"),
            OsStr::new("-f"),
            OsStr::new("image2pipe"),
            OsStr::new("-vcodec"),
            OsStr::new("png"),
            OsStr::new("-"),
        ])?;

        debug!(?path, bytes = png.len(), "Captured first frame");
        image_loader::decode_bytes(png).map_err(|e| ProbeError::BadOutput {
            tool: "ffmpeg".into(),
            reason: e.to_string(),
        })
    }

    /// Container duration in seconds.
    pub fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let out = self.ffprobe.run([
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            path.as_os_str(),
        ])?;

        parse_duration(&out).ok_or_else(|| ProbeError::BadOutput {
            tool: "ffprobe".into(),
            reason: String::from_utf8_lossy(&out).trim().to_string(),
        })
    }
}

fn parse_duration(out: &[u8]) -> Option<f64> {
    let secs: f64 = std::str::from_utf8(out).ok()?.trim().parse().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}
