//! Embedded EXIF creation date, read in-process with kamadak-exif.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Reader, Tag, Value};
use tracing::trace;

/// DateTimeOriginal, else DateTime, as the raw tag string.
pub fn read_create_date(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let exif = match Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => exif,
        Err(e) => {
            trace!(?path, error = %e, "No embedded EXIF");
            return None;
        }
    };

    let date = [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .find_map(|tag| ascii_field(&exif, tag));
    trace!(?path, ?date, "Embedded EXIF date");
    date
}

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref parts) = field.value else {
        return None;
    };
    let text = String::from_utf8_lossy(parts.first()?)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const TAG_DATE_TIME: u16 = 0x0132;
    const TAG_EXIF_IFD: u16 = 0x8769;
    const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
    const TYPE_ASCII: u16 = 2;
    const TYPE_LONG: u16 = 4;

    /// Little-endian TIFF with IFD0 { DateTime, ExifIFD -> { DateTimeOriginal } }.
    fn tiff_le(date_time: &str, original: Option<&str>) -> Vec<u8> {
        let mut t = b"II*\0".to_vec();
        t.extend_from_slice(&8u32.to_le_bytes());

        let ifd0_entries: u16 = if original.is_some() { 2 } else { 1 };
        let ifd0_len = 2 + 12 * ifd0_entries as usize + 4;
        let exif_ifd = 8 + ifd0_len;
        let exif_len = if original.is_some() { 2 + 12 + 4 } else { 0 };
        let strings = exif_ifd + exif_len;

        let dt = format!("{date_time}\0");
        let orig = original.map(|o| format!("{o}\0")).unwrap_or_default();

        t.extend_from_slice(&ifd0_entries.to_le_bytes());
        t.extend_from_slice(&TAG_DATE_TIME.to_le_bytes());
        t.extend_from_slice(&TYPE_ASCII.to_le_bytes());
        t.extend_from_slice(&(dt.len() as u32).to_le_bytes());
        t.extend_from_slice(&(strings as u32).to_le_bytes());
        if original.is_some() {
            t.extend_from_slice(&TAG_EXIF_IFD.to_le_bytes());
            t.extend_from_slice(&TYPE_LONG.to_le_bytes());
            t.extend_from_slice(&1u32.to_le_bytes());
            t.extend_from_slice(&(exif_ifd as u32).to_le_bytes());
        }
        t.extend_from_slice(&0u32.to_le_bytes());

        if original.is_some() {
            t.extend_from_slice(&1u16.to_le_bytes());
            t.extend_from_slice(&TAG_DATE_TIME_ORIGINAL.to_le_bytes());
            t.extend_from_slice(&TYPE_ASCII.to_le_bytes());
            t.extend_from_slice(&(orig.len() as u32).to_le_bytes());
            t.extend_from_slice(&((strings + dt.len()) as u32).to_le_bytes());
            t.extend_from_slice(&0u32.to_le_bytes());
        }

        assert_eq!(t.len(), strings);
        t.extend_from_slice(dt.as_bytes());
        t.extend_from_slice(orig.as_bytes());
        t
    }

    /// JPEG with an APP0 segment, then `fill` 0xFF fill bytes, then the Exif APP1.
    fn jpeg_with(tiff: &[u8], fill: usize) -> Vec<u8> {
        let mut j = vec![0xFF, 0xD8];
        j.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        j.extend(std::iter::repeat(0xFF).take(fill));
        let payload_len = 2 + 6 + tiff.len();
        j.extend_from_slice(&[0xFF, 0xE1]);
        j.extend_from_slice(&(payload_len as u16).to_be_bytes());
        j.extend_from_slice(b"Exif\0\0");
        j.extend_from_slice(tiff);
        j.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        j
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &b in bytes {
            crc ^= b as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    /// A decodable 2x2 PNG with an eXIf chunk spliced in after IHDR.
    fn png_with(tiff: &[u8]) -> Vec<u8> {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        // 8-byte signature + IHDR (4 len + 4 type + 13 data + 4 crc).
        let after_ihdr = 8 + 25;
        let mut chunk = (tiff.len() as u32).to_be_bytes().to_vec();
        let mut typed = b"eXIf".to_vec();
        typed.extend_from_slice(tiff);
        chunk.extend_from_slice(&typed);
        chunk.extend_from_slice(&crc32(&typed).to_be_bytes());

        png.splice(after_ihdr..after_ihdr, chunk);
        png
    }

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_prefers_date_time_original() {
        let dir = tempdir().unwrap();
        let tiff = tiff_le("2020:01:01 00:00:00", Some("2019:07:04 12:30:00"));
        let path = write(dir.path(), "raw.tif", &tiff);
        assert_eq!(
            read_create_date(&path).as_deref(),
            Some("2019:07:04 12:30:00")
        );
    }

    #[test]
    fn test_falls_back_to_date_time() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "raw.tif", &tiff_le("2020:01:01 00:00:00", None));
        assert_eq!(
            read_create_date(&path).as_deref(),
            Some("2020:01:01 00:00:00")
        );
    }

    #[test]
    fn test_reads_jpeg_app1() {
        let dir = tempdir().unwrap();
        let tiff = tiff_le("2018:02:03 04:05:06", None);
        let plain = write(dir.path(), "photo.jpg", &jpeg_with(&tiff, 0));
        let padded = write(dir.path(), "padded.jpg", &jpeg_with(&tiff, 1));
        assert_eq!(
            read_create_date(&plain).as_deref(),
            Some("2018:02:03 04:05:06")
        );
        assert_eq!(
            read_create_date(&padded).as_deref(),
            Some("2018:02:03 04:05:06")
        );
    }

    #[test]
    fn test_reads_png_exif_chunk() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "shot.png",
            &png_with(&tiff_le("2018:02:03 04:05:06", None)),
        );
        assert!(image::open(&path).is_ok());
        assert_eq!(
            read_create_date(&path).as_deref(),
            Some("2018:02:03 04:05:06")
        );
    }

    #[test]
    fn test_no_exif() {
        let dir = tempdir().unwrap();
        let plain = write(dir.path(), "plain.jpg", &[0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02]);
        let gif = write(dir.path(), "anim.gif", b"GIF89a");
        assert_eq!(read_create_date(&plain), None);
        assert_eq!(read_create_date(&gif), None);
        assert_eq!(read_create_date(&dir.path().join("absent.jpg")), None);
    }
}
