//! Media metadata from exiftool output and embedded EXIF tags.
//!
//! exiftool reports loosely named `Group:Tag` keys. They are mapped onto the
//! closed [`MetadataField`] set through a lookup table of normalised
//! (lower-case) names; unrecognised keys are ignored.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, trace};

use super::exif;
use crate::error::ProbeError;
use crate::tool::ExternalTool;

/// Timestamp layout used by EXIF and QuickTime date tags.
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    FileName,
    CameraMake,
    CameraModel,
    CreateDate,
    SubSecTimeOriginal,
    ShutterSpeed,
    Aperture,
    Iso,
    FocalLength35mm,
    ExposureCompensation,
    LensModel,
    Software,
    SerialNumber,
    ImageSize,
    VideoFrameRate,
    VideoCodec,
}

impl MetadataField {
    pub const COUNT: usize = 16;

    /// Display order for detail views.
    pub const ALL: [MetadataField; Self::COUNT] = [
        Self::FileName,
        Self::CreateDate,
        Self::SubSecTimeOriginal,
        Self::ShutterSpeed,
        Self::Aperture,
        Self::Iso,
        Self::FocalLength35mm,
        Self::CameraMake,
        Self::CameraModel,
        Self::LensModel,
        Self::ExposureCompensation,
        Self::Software,
        Self::SerialNumber,
        Self::ImageSize,
        Self::VideoFrameRate,
        Self::VideoCodec,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FileName => "Filename",
            Self::CameraMake => "Camera make",
            Self::CameraModel => "Camera model",
            Self::CreateDate => "Create date",
            Self::SubSecTimeOriginal => "Sub-second",
            Self::ShutterSpeed => "Shutter speed",
            Self::Aperture => "Aperture",
            Self::Iso => "ISO",
            Self::FocalLength35mm => "Focal length (35mm)",
            Self::ExposureCompensation => "Exposure compensation",
            Self::LensModel => "Lens model",
            Self::Software => "Software version",
            Self::SerialNumber => "Serial number",
            Self::ImageSize => "Resolution",
            Self::VideoFrameRate => "Framerate",
            Self::VideoCodec => "Video codec",
        }
    }
}

static TAG_TABLE: Lazy<HashMap<&'static str, MetadataField>> = Lazy::new(|| {
    use MetadataField::*;
    HashMap::from([
        ("file:filename", FileName),
        ("exif:make", CameraMake),
        ("quicktime:make", CameraMake),
        ("exif:model", CameraModel),
        ("quicktime:model", CameraModel),
        ("exif:createdate", CreateDate),
        ("quicktime:createdate", CreateDate),
        ("exif:subsectimeoriginal", SubSecTimeOriginal),
        ("composite:shutterspeed", ShutterSpeed),
        ("exif:fnumber", Aperture),
        ("exif:iso", Iso),
        ("exif:focallengthin35mmformat", FocalLength35mm),
        ("exif:exposurecompensation", ExposureCompensation),
        ("quicktime:exposurecompensation", ExposureCompensation),
        ("exif:lensmodel", LensModel),
        ("exif:software", Software),
        ("quicktime:firmwareversion", Software),
        ("exif:serialnumber", SerialNumber),
        ("quicktime:cameraserialnumber", SerialNumber),
        ("composite:imagesize", ImageSize),
        ("quicktime:videoframerate", VideoFrameRate),
        ("quicktime:compressorid", VideoCodec),
    ])
});

/// Resolve an exiftool `Group:Tag` key.
pub fn lookup_tag(key: &str) -> Option<MetadataField> {
    TAG_TABLE.get(key.to_ascii_lowercase().as_str()).copied()
}

/// Recognised metadata of one file: one optional value per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    values: [Option<String>; MetadataField::COUNT],
}

impl MediaMetadata {
    /// Build from one exiftool `-j -G` object.
    pub fn from_exiftool(object: &serde_json::Map<String, Value>) -> Self {
        let mut meta = Self::default();
        for (key, value) in object {
            let Some(field) = lookup_tag(key) else {
                continue;
            };
            if let Some(text) = format_value(field, value) {
                meta.values[field.slot()] = Some(text);
            }
        }
        meta
    }

    pub fn get(&self, field: MetadataField) -> Option<&str> {
        self.values[field.slot()].as_deref()
    }

    /// Take every field `other` has; fields it lacks are kept.
    pub fn merge(&mut self, other: MediaMetadata) {
        for (slot, value) in self.values.iter_mut().zip(other.values) {
            if value.is_some() {
                *slot = value;
            }
        }
    }

    /// Creation time in Unix seconds, read as UTC.
    pub fn create_epoch(&self) -> Option<i64> {
        self.get(MetadataField::CreateDate).and_then(parse_exif_date)
    }

    /// Present fields as `(label, value)` in display order.
    pub fn display_rows(&self) -> Vec<(&'static str, &str)> {
        MetadataField::ALL
            .iter()
            .filter_map(|&field| self.get(field).map(|v| (field.label(), v)))
            .collect()
    }
}

fn format_value(field: MetadataField, value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let formatted = match field {
        MetadataField::ShutterSpeed => match value.as_f64() {
            Some(secs) if secs > 0.0 && secs < 1.0 => format!("1/{} s", (1.0 / secs).round()),
            Some(secs) => format!("{secs} s"),
            None => text,
        },
        MetadataField::Aperture => format!("f{text}"),
        MetadataField::FocalLength35mm if value.is_number() => format!("{text}mm"),
        MetadataField::ImageSize => text.replace(' ', "x"),
        MetadataField::VideoCodec => match text.as_str() {
            "hvc1" | "hev1" => "H.265".to_string(),
            "avc1" => "H.264".to_string(),
            other => format!("unknown ({other})"),
        },
        _ => text,
    };
    Some(formatted)
}

/// Parse `YYYY:MM:DD HH:MM:SS` as UTC seconds.
pub fn parse_exif_date(text: &str) -> Option<i64> {
    let text = text.trim_end_matches('\0').trim();
    let head = text.get(..19).unwrap_or(text);
    NaiveDateTime::parse_from_str(head, EXIF_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Wrapper around the `exiftool` executable.
#[derive(Debug, Clone)]
pub struct ExifTool {
    tool: ExternalTool,
}

impl ExifTool {
    pub fn new(program: &Path, timeout: Duration) -> Self {
        Self {
            tool: ExternalTool::new(program, timeout),
        }
    }

    pub fn read(&self, path: &Path) -> Result<MediaMetadata, ProbeError> {
        let out = self
            .tool
            .run([std::ffi::OsStr::new("-j"), std::ffi::OsStr::new("-G"), path.as_os_str()])?;
        parse_exiftool_json(&out).ok_or_else(|| ProbeError::BadOutput {
            tool: "exiftool".into(),
            reason: "expected a JSON array of objects".into(),
        })
    }
}

fn parse_exiftool_json(out: &[u8]) -> Option<MediaMetadata> {
    let parsed: Vec<serde_json::Map<String, Value>> = serde_json::from_slice(out).ok()?;
    let mut merged = MediaMetadata::default();
    for object in &parsed {
        merged.merge(MediaMetadata::from_exiftool(object));
    }
    Some(merged)
}

/// Best-effort creation time: embedded EXIF first, then exiftool.
#[derive(Debug, Clone)]
pub struct TimestampResolver {
    exiftool: Option<ExifTool>,
}

impl TimestampResolver {
    pub fn new(exiftool: Option<ExifTool>) -> Self {
        Self { exiftool }
    }

    pub fn resolve(&self, metadata_path: &Path) -> Option<i64> {
        if let Some(epoch) = exif::read_create_date(metadata_path).and_then(|s| parse_exif_date(&s))
        {
            trace!(?metadata_path, epoch, "Timestamp from embedded EXIF");
            return Some(epoch);
        }

        let exiftool = self.exiftool.as_ref()?;
        match exiftool.read(metadata_path) {
            Ok(meta) => meta.create_epoch(),
            Err(e) => {
                debug!(?metadata_path, error = %e, "exiftool gave no timestamp");
                None
            }
        }
    }
}
