use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Deserialize;

/// Catalog vocabulary for a file's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    Image,
    ImagePreview,
    Video,
    GnssTrack,
    #[serde(other)]
    Unknown,
}

/// Closed set of decode strategies. Every `FileType` maps onto exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    GnssTrack,
    Unknown,
}

impl From<FileType> for MediaKind {
    fn from(file_type: FileType) -> Self {
        match file_type {
            FileType::Image | FileType::ImagePreview => Self::Image,
            FileType::Video => Self::Video,
            FileType::GnssTrack => Self::GnssTrack,
            FileType::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceProperties {
    #[default]
    Normal,
    ReadOnly,
}

/// One media file as reported by the source catalog.
///
/// Identity is `file_path`; two descriptors with the same path are the same item.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    pub source_index: usize,
    pub file_path: PathBuf,
    pub item_type: FileType,
    pub file_type: FileType,
    pub part_number: u32,
    pub part_count: u32,
    pub metadata_file: Option<PathBuf>,
    pub source_properties: SourceProperties,
}

impl MediaDescriptor {
    pub fn kind(&self) -> MediaKind {
        self.file_type.into()
    }

    /// File holding the tags used for timestamp resolution.
    pub fn metadata_path(&self) -> &Path {
        self.metadata_file.as_deref().unwrap_or(&self.file_path)
    }

    pub fn is_multi_part(&self) -> bool {
        self.part_count > 1
    }

    pub fn is_read_only(&self) -> bool {
        self.source_properties == SourceProperties::ReadOnly
    }
}

/// A descriptor after decoding, owned by the grid.
#[derive(Debug, Clone)]
pub struct LoadedItem {
    pub descriptor: MediaDescriptor,
    pub thumbnail: RgbImage,
    /// Creation time in Unix seconds. `None` sorts before every known time.
    pub create_epoch: Option<i64>,
    /// The thumbnail is a placeholder.
    pub degraded: bool,
    /// A destination already holds a link to this file.
    pub linked: bool,
}

impl LoadedItem {
    pub fn path(&self) -> &Path {
        &self.descriptor.file_path
    }

    pub fn is_selectable(&self) -> bool {
        !self.descriptor.is_read_only()
    }
}
