//! Per-item decode: thumbnail plus best-effort creation time.
//!
//! One decode path per [`MediaKind`]. Anything short of a missing source file
//! degrades to a placeholder instead of failing the item.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use tracing::{trace, warn};

use super::generator::{ThumbBox, ThumbnailGenerator};
use crate::error::PreloadError;
use crate::gnss::{self, tiles::TileProvider};
use crate::image_loader;
use crate::models::{MediaDescriptor, MediaKind};
use crate::scanner::metadata::TimestampResolver;
use crate::video::probe::VideoProbe;

#[derive(Debug, Clone)]
pub struct DecodedMedia {
    pub thumbnail: RgbImage,
    pub create_epoch: Option<i64>,
    /// `thumbnail` is a placeholder.
    pub degraded: bool,
}

/// Turns one descriptor into a thumbnail and timestamp. Called concurrently
/// from the preload workers.
pub trait MediaDecoder: Send + Sync {
    fn decode(&self, descriptor: &MediaDescriptor) -> Result<DecodedMedia, PreloadError>;
}

pub struct StandardDecoder {
    thumb_box: ThumbBox,
    video: VideoProbe,
    tiles: Arc<dyn TileProvider>,
    timestamps: TimestampResolver,
}

impl StandardDecoder {
    pub fn new(
        thumb_box: ThumbBox,
        video: VideoProbe,
        tiles: Arc<dyn TileProvider>,
        timestamps: TimestampResolver,
    ) -> Self {
        Self {
            thumb_box,
            video,
            tiles,
            timestamps,
        }
    }

    fn decode_image(&self, path: &Path) -> Option<RgbImage> {
        match image_loader::open_image(path) {
            Ok(img) => Some(ThumbnailGenerator::fit(&img, self.thumb_box)),
            Err(e) => {
                warn!(?path, error = %e, "Image decode failed");
                None
            }
        }
    }

    fn decode_video(&self, path: &Path) -> Option<RgbImage> {
        match self.video.first_frame(path) {
            Ok(frame) => Some(ThumbnailGenerator::fit(&frame, self.thumb_box)),
            Err(e) => {
                warn!(?path, error = %e, "No video frame");
                None
            }
        }
    }

    fn decode_track(&self, path: &Path) -> (Option<RgbImage>, Option<i64>) {
        match gnss::track_thumbnail(path, self.tiles.as_ref()) {
            Ok((map, epoch)) => (Some(ThumbnailGenerator::fit(&map.into(), self.thumb_box)), epoch),
            Err(e) => {
                warn!(?path, error = %e, "Track render failed");
                (None, None)
            }
        }
    }
}

impl MediaDecoder for StandardDecoder {
    fn decode(&self, descriptor: &MediaDescriptor) -> Result<DecodedMedia, PreloadError> {
        let path = descriptor.file_path.as_path();
        if !path.exists() {
            return Err(PreloadError::MissingFile(path.to_path_buf()));
        }

        let kind = descriptor.kind();
        let (thumbnail, own_epoch) = match kind {
            MediaKind::Image => (self.decode_image(path), None),
            MediaKind::Video => (self.decode_video(path), None),
            MediaKind::GnssTrack => self.decode_track(path),
            MediaKind::Unknown => {
                return Ok(DecodedMedia {
                    thumbnail: ThumbnailGenerator::corrupted_placeholder(self.thumb_box),
                    create_epoch: None,
                    degraded: true,
                })
            }
        };

        let create_epoch =
            own_epoch.or_else(|| self.timestamps.resolve(descriptor.metadata_path()));
        trace!(?path, ?kind, ?create_epoch, "Decoded item");

        let degraded = thumbnail.is_none();
        Ok(DecodedMedia {
            thumbnail: thumbnail
                .unwrap_or_else(|| ThumbnailGenerator::corrupted_placeholder(self.thumb_box)),
            create_epoch,
            degraded,
        })
    }
}
