//! GNSS track thumbnails: a map of the track area with the route drawn on it.

pub mod render;
pub mod tiles;
pub mod track;

use std::path::Path;

use image::RgbImage;

use crate::error::TrackError;
use tiles::TileProvider;
use track::Track;

/// Map image of the track at `path` and the time of its first point.
pub fn track_thumbnail(
    path: &Path,
    tiles: &dyn TileProvider,
) -> Result<(RgbImage, Option<i64>), TrackError> {
    let track = Track::read(path)?;
    Ok((render::render_track(&track, tiles), track.start_epoch()))
}
