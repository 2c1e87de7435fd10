use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat};

pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    decode_bytes(bytes).with_context(|| format!("Failed to decode image: {:?}", path))
}

/// Decode an in-memory image (ffmpeg frames, map tiles). Animated GIFs yield
/// their first frame.
pub fn decode_bytes(bytes: Vec<u8>) -> Result<DynamicImage> {
    let format = image::guess_format(&bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(&bytes, fmt).map_err(Into::into),
        None => image::load_from_memory(&bytes).map_err(Into::into),
    }
}
