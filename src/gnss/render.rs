//! Web-Mercator tile math and track drawing.

use std::f64::consts::PI;

use image::{imageops, Rgb, RgbImage};
use tracing::debug;

use super::tiles::{TileKey, TileProvider, TILE_SIZE};
use super::track::{Bounds, Track};

pub const MAX_ZOOM: u8 = 19;
pub const MIN_ZOOM: u8 = 2;

/// Tiles allowed along each axis of a track map.
pub const MAX_TILES_PER_AXIS: u32 = 2;

const TRACK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TRACK_WIDTH: f64 = 4.0;

/// Fractional tile coordinates of a position.
fn project(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let lat_rad = lat.to_radians();
    let n = 2f64.powi(zoom as i32);
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Tile containing a position, clamped to the valid range for `zoom`.
pub fn deg2tile(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let (x, y) = project(lat, lon, zoom);
    let max = (1u32 << zoom) - 1;
    let clamp = |v: f64| (v.floor().max(0.0) as u32).min(max);
    (clamp(x), clamp(y))
}

/// Pixel position of a coordinate relative to the top-left of tile `origin`.
pub fn deg2pixel(lat: f64, lon: f64, zoom: u8, origin: (u32, u32)) -> (f64, f64) {
    let (x, y) = project(lat, lon, zoom);
    let size = TILE_SIZE as f64;
    (x * size - origin.0 as f64 * size, y * size - origin.1 as f64 * size)
}

/// Most detailed zoom at which `bounds` spans at most the tile budget.
pub fn calculate_zoom(bounds: &Bounds) -> u8 {
    (MIN_ZOOM..=MAX_ZOOM)
        .rev()
        .find(|&zoom| {
            let (x1, y1) = deg2tile(bounds.max_lat, bounds.min_lon, zoom);
            let (x2, y2) = deg2tile(bounds.min_lat, bounds.max_lon, zoom);
            x1.abs_diff(x2) < MAX_TILES_PER_AXIS && y1.abs_diff(y2) < MAX_TILES_PER_AXIS
        })
        .unwrap_or(MIN_ZOOM)
}

/// Stitch the tiles under `track` and draw it as a red polyline.
pub fn render_track(track: &Track, tiles: &dyn TileProvider) -> RgbImage {
    let bounds = track.bounds();
    let zoom = calculate_zoom(&bounds);
    let (min_x, min_y) = deg2tile(bounds.max_lat, bounds.min_lon, zoom);
    let (max_x, max_y) = deg2tile(bounds.min_lat, bounds.max_lon, zoom);

    debug!(zoom, min_x, max_x, min_y, max_y, "Rendering track map");

    let mut map = RgbImage::new(
        (max_x - min_x + 1) * TILE_SIZE,
        (max_y - min_y + 1) * TILE_SIZE,
    );
    for x in min_x..=max_x {
        for y in min_y..=max_y {
            let tile = tiles.tile(TileKey { zoom, x, y });
            imageops::replace(
                &mut map,
                tile.as_ref(),
                ((x - min_x) * TILE_SIZE) as i64,
                ((y - min_y) * TILE_SIZE) as i64,
            );
        }
    }

    let pixels: Vec<(f64, f64)> = track
        .points
        .iter()
        .map(|p| deg2pixel(p.lat, p.lon, zoom, (min_x, min_y)))
        .collect();
    draw_polyline(&mut map, &pixels, TRACK_WIDTH, TRACK_COLOR);
    map
}

/// Thick polyline made of filled discs stamped along each segment.
fn draw_polyline(img: &mut RgbImage, points: &[(f64, f64)], width: f64, color: Rgb<u8>) {
    let radius = width / 2.0;
    let stamp = |img: &mut RgbImage, cx: f64, cy: f64| {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let r = radius.ceil() as i64;
        for dy in -r..=r {
            for dx in -r..=r {
                let px = cx.round() as i64 + dx;
                let py = cy.round() as i64 + dy;
                if (dx * dx + dy * dy) as f64 <= radius * radius
                    && (0..w).contains(&px)
                    && (0..h).contains(&py)
                {
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    };

    if let [(x, y)] = points {
        stamp(img, *x, *y);
    }
    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            stamp(img, x0 + (x1 - x0) * t, y0 + (y1 - y0) * t);
        }
    }
}
