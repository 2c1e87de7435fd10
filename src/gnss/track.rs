//! GPX track parsing.

use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::TrackError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// All `trkpt` points of a GPX file, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub points: Vec<TrackPoint>,
}

impl Track {
    pub fn read(path: &Path) -> Result<Self, TrackError> {
        let xml = std::fs::read_to_string(path).map_err(|source| TrackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&xml)
    }

    pub fn parse(xml: &str) -> Result<Self, TrackError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut points = Vec::new();
        let mut current: Option<TrackPoint> = None;
        let mut in_time = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"trkpt" => current = Some(point_from_attrs(&e)?),
                    b"time" => in_time = current.is_some(),
                    _ => {}
                },
                Event::Empty(e) if e.local_name().as_ref() == b"trkpt" => {
                    points.push(point_from_attrs(&e)?);
                }
                Event::Text(t) if in_time => {
                    if let Some(point) = current.as_mut() {
                        point.time = DateTime::parse_from_rfc3339(t.unescape()?.trim())
                            .ok()
                            .map(|dt| dt.with_timezone(&Utc));
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"trkpt" => points.extend(current.take()),
                    b"time" => in_time = false,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if points.is_empty() {
            return Err(TrackError::Empty);
        }
        Ok(Self { points })
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        };
        for p in &self.points {
            b.min_lat = b.min_lat.min(p.lat);
            b.max_lat = b.max_lat.max(p.lat);
            b.min_lon = b.min_lon.min(p.lon);
            b.max_lon = b.max_lon.max(p.lon);
        }
        b
    }

    /// Time of the first point, in Unix seconds.
    pub fn start_epoch(&self) -> Option<i64> {
        self.points.first()?.time.map(|t| t.timestamp())
    }
}

fn point_from_attrs(e: &BytesStart<'_>) -> Result<TrackPoint, TrackError> {
    let mut lat = None;
    let mut lon = None;
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        let parsed = || {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| TrackError::Coordinate(value.to_string()))
        };
        match attr.key.local_name().as_ref() {
            b"lat" => lat = Some(parsed()?),
            b"lon" => lon = Some(parsed()?),
            _ => {}
        }
    }
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(TrackPoint {
            lat,
            lon,
            time: None,
        }),
        _ => Err(TrackError::Coordinate("trkpt without lat/lon".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><time>2000-01-01T00:00:00Z</time></metadata>
  <trk><name>Ride</name><trkseg>
    <trkpt lat="60.1699" lon="24.9384"><ele>10</ele><time>2023-08-01T06:30:00Z</time></trkpt>
    <trkpt lat="60.1710" lon="24.9410"><time>2023-08-01T06:31:00Z</time></trkpt>
    <trkpt lat="60.1650" lon="24.9300"/>
  </trkseg></trk>
</gpx>"#;

    #[test]
    fn test_parse_points_and_times() {
        let track = Track::parse(GPX).unwrap();
        assert_eq!(track.points.len(), 3);
        assert_eq!(track.points[0].lat, 60.1699);
        assert!(track.points[2].time.is_none());
        // Metadata time is not a track time.
        assert_eq!(track.start_epoch(), Some(1_690_871_400));
    }

    #[test]
    fn test_bounds() {
        let b = Track::parse(GPX).unwrap().bounds();
        assert_eq!(b.min_lat, 60.1650);
        assert_eq!(b.max_lat, 60.1710);
        assert_eq!(b.min_lon, 24.9300);
        assert_eq!(b.max_lon, 24.9410);
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(matches!(
            Track::parse("<gpx><trk></trk></gpx>"),
            Err(TrackError::Empty)
        ));
        assert!(matches!(
            Track::parse(r#"<gpx><trk><trkseg><trkpt lat="x" lon="1"/></trkseg></trk></gpx>"#),
            Err(TrackError::Coordinate(_))
        ));
    }
}
