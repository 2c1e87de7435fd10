//! Everything that reads from outside the process: the source catalog,
//! file metadata and destination link scans.

pub mod catalog;
pub mod exif;
pub mod linked;
pub mod metadata;
