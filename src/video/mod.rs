//! Video support: ffmpeg probes, the multi-part timeline and its players.

#[cfg(feature = "mpv")]
pub mod player;
pub mod probe;
pub mod timeline;
