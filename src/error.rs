//! Domain error types.
//!
//! Per-item problems that only degrade a result (corrupt image, decode
//! timeout, unknown timestamp) are not errors here; they become placeholders.
//! These enums cover failures a caller has to react to.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure talking to the external source catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to launch catalog {executable:?}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog did not answer within {0:?}")]
    Timeout(Duration),

    #[error("catalog exited with status {status}: {message}")]
    Failed { status: i32, message: String },

    #[error("catalog returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("catalog response carries no version tag")]
    MissingVersion,

    #[error("incompatible catalog protocol version {found} (expected v1)")]
    IncompatibleVersion { found: String },

    #[error("catalog task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Per-item fatal preload failure.
#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("source file does not exist: {0:?}")]
    MissingFile(PathBuf),

    #[error("decoder panicked while processing {0:?}")]
    Panicked(PathBuf),
}

/// Failure of an external probe (ffmpeg, ffprobe, exiftool).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} exited with status {status}")]
    Failed { tool: String, status: i32 },

    #[error("{tool} produced unusable output: {reason}")]
    BadOutput { tool: String, reason: String },
}

/// Failure reading a GNSS track file.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to read track {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed GPX: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("invalid coordinate {0:?}")]
    Coordinate(String),

    #[error("track has no points")]
    Empty,
}

/// Failure building or driving a multi-segment video timeline.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("recording has no playable segments")]
    NoSegments,

    #[error("playback backend error: {0}")]
    Backend(String),
}
