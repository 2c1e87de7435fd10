//! Preload pipeline for the media grid.
//!
//! This module provides:
//! - `ThumbnailGenerator` - Fits decoded images into the thumbnail box
//! - `MediaDecoder` / `StandardDecoder` - Per-kind decode and timestamp lookup
//! - `PreloadPipeline` - Worker pool that decodes every item exactly once

pub mod decoder;
pub mod generator;
pub mod queue;
