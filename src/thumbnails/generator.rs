//! Thumbnail generation using the image crate.
//!
//! Thumbnails are RGB8, scaled to fit inside the grid's thumbnail box while
//! preserving aspect ratio. Sources smaller than the box are not upscaled.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::trace;

const CORRUPTED_FILL: Rgb<u8> = Rgb([40, 40, 40]);
const CORRUPTED_MARK: Rgb<u8> = Rgb([200, 40, 40]);

/// Stroke width of the corrupted-file cross, in pixels.
const MARK_WIDTH: i64 = 3;

/// Target box for thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbBox {
    pub width: u32,
    pub height: u32,
}

impl ThumbBox {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

pub struct ThumbnailGenerator;

impl ThumbnailGenerator {
    /// Convert to RGB8 and scale to fit inside `target`.
    pub fn fit(img: &DynamicImage, target: ThumbBox) -> RgbImage {
        let (src_width, src_height) = img.dimensions();
        let (thumb_width, thumb_height) = Self::calculate_dimensions(src_width, src_height, target);

        trace!(
            src_width,
            src_height,
            thumb_width,
            thumb_height,
            "Calculated thumbnail dimensions"
        );

        if (thumb_width, thumb_height) == (src_width, src_height) {
            return img.to_rgb8();
        }
        // CatmullRom provides good quality/speed balance for downscaling
        img.resize_exact(thumb_width, thumb_height, FilterType::CatmullRom)
            .to_rgb8()
    }

    /// Largest size with the source aspect ratio that fits in `target`.
    fn calculate_dimensions(src_width: u32, src_height: u32, target: ThumbBox) -> (u32, u32) {
        if src_height == 0 || src_width == 0 {
            return (target.width, target.height);
        }

        let scale = (target.width as f64 / src_width as f64)
            .min(target.height as f64 / src_height as f64)
            .min(1.0);

        let width = (src_width as f64 * scale).round() as u32;
        let height = (src_height as f64 * scale).round() as u32;

        (width.clamp(1, target.width), height.clamp(1, target.height))
    }

    /// Dark box with a red cross, used for anything that failed to decode.
    pub fn corrupted_placeholder(target: ThumbBox) -> RgbImage {
        let mut img = RgbImage::from_pixel(target.width, target.height, CORRUPTED_FILL);
        let (w, h) = (target.width as i64, target.height as i64);
        let steps = w.max(h);
        for i in 0..steps {
            let x = i * w / steps;
            let y = i * h / steps;
            for d in -(MARK_WIDTH / 2)..=(MARK_WIDTH / 2) {
                for (px, py) in [(x + d, y), (w - 1 - x + d, y)] {
                    if (0..w).contains(&px) && (0..h).contains(&py) {
                        img.put_pixel(px as u32, py as u32, CORRUPTED_MARK);
                    }
                }
            }
        }
        img
    }
}
