//! One logical playhead over the physical files of a multi-part recording.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ProbeError, TimelineError};
use crate::models::MediaDescriptor;

/// Stand-in length for a part whose duration cannot be probed.
pub const PLACEHOLDER_DURATION: f64 = 1.0;

/// How long a segment switch waits for the backend to report a position.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub path: PathBuf,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Contiguous segments starting at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentMap {
    segments: Vec<Segment>,
}

impl SegmentMap {
    /// Lay out parts `1..=part_count` of `file` back to back.
    ///
    /// Parts are looked up by part number in `related`, falling back to
    /// `file` itself. A part that is not found is skipped.
    pub fn build<F>(
        file: &MediaDescriptor,
        related: &[MediaDescriptor],
        mut duration: F,
    ) -> Result<Self, TimelineError>
    where
        F: FnMut(&Path) -> Result<f64, ProbeError>,
    {
        let mut map = Self::default();
        for part in 1..=file.part_count.max(1) {
            let Some(descriptor) = related
                .iter()
                .chain(std::iter::once(file))
                .find(|d| d.part_number == part)
            else {
                warn!(file = ?file.file_path, part, "Part missing from related list");
                continue;
            };

            let length = duration(&descriptor.file_path).unwrap_or_else(|e| {
                warn!(path = ?descriptor.file_path, error = %e, "Duration probe failed");
                PLACEHOLDER_DURATION
            });
            map.push(descriptor.file_path.clone(), length);
        }

        if map.segments.is_empty() {
            return Err(TimelineError::NoSegments);
        }
        Ok(map)
    }

    pub fn from_durations<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, f64)>,
    {
        let mut map = Self::default();
        for (path, length) in parts {
            map.push(path, length);
        }
        map
    }

    fn push(&mut self, path: PathBuf, length: f64) {
        let start = self.total();
        self.segments.push(Segment {
            path,
            start,
            end: start + length,
        });
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.end)
    }

    /// Segment index and local offset of global time `t`.
    ///
    /// `t` is clamped to `[0, total]`; the total itself maps to the end of
    /// the last segment.
    pub fn resolve(&self, t: f64) -> Option<(usize, f64)> {
        let last = self.segments.len().checked_sub(1)?;
        let t = t.clamp(0.0, self.total());
        let index = self
            .segments
            .iter()
            .position(|s| s.end > t)
            .unwrap_or(last);
        Some((index, t - self.segments[index].start))
    }
}

/// The player a timeline drives. Positions are local to the loaded file.
pub trait PlaybackBackend {
    fn load(&mut self, path: &Path) -> Result<(), TimelineError>;
    /// `None` until the loaded file has a valid position.
    fn position(&self) -> Option<f64>;
    fn seek(&mut self, seconds: f64) -> Result<(), TimelineError>;
    fn set_paused(&mut self, paused: bool) -> Result<(), TimelineError>;
    fn frame_step(&mut self) -> Result<(), TimelineError>;
    fn frame_back_step(&mut self) -> Result<(), TimelineError>;
    fn reached_end(&self) -> bool;
}

/// Result of one `poll` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEvent {
    Idle,
    Advanced(usize),
    Finished,
}

pub struct VideoTimeline<B: PlaybackBackend> {
    map: SegmentMap,
    backend: B,
    current: Option<usize>,
    paused: bool,
    finished: bool,
    load_timeout: Duration,
}

impl<B: PlaybackBackend> VideoTimeline<B> {
    pub fn new(map: SegmentMap, backend: B) -> Result<Self, TimelineError> {
        if map.is_empty() {
            return Err(TimelineError::NoSegments);
        }
        Ok(Self {
            map,
            backend,
            current: None,
            paused: true,
            finished: false,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        })
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn segments(&self) -> &SegmentMap {
        &self.map
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn current_segment(&self) -> Option<usize> {
        self.current
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn total(&self) -> f64 {
        self.map.total()
    }

    /// Load segment `index` and wait until it reports a position.
    fn switch_to(&mut self, index: usize) -> Result<(), TimelineError> {
        let path = self.map.segments[index].path.clone();
        debug!(?path, index, "Switching segment");
        self.backend.load(&path)?;
        self.backend.set_paused(self.paused)?;
        self.current = Some(index);

        let deadline = Instant::now() + self.load_timeout;
        while self.backend.position().is_none() {
            if Instant::now() >= deadline {
                warn!(?path, timeout = ?self.load_timeout, "Segment did not report a position");
                break;
            }
            thread::sleep(LOAD_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Move the playhead to global time `t`. Returns the resolved segment
    /// and local offset.
    pub fn scrub_to(&mut self, t: f64) -> Result<(usize, f64), TimelineError> {
        let (index, local) = self.map.resolve(t).ok_or(TimelineError::NoSegments)?;
        if self.current != Some(index) {
            self.switch_to(index)?;
        }
        self.backend.seek(local)?;
        self.finished = false;
        Ok((index, local))
    }

    /// Global playhead position.
    pub fn position(&self) -> f64 {
        match self.current {
            Some(index) => {
                let segment = &self.map.segments[index];
                segment.start + self.backend.position().unwrap_or(0.0).min(segment.duration())
            }
            None => 0.0,
        }
    }

    pub fn play(&mut self) -> Result<(), TimelineError> {
        if self.finished {
            self.scrub_to(0.0)?;
        } else if self.current.is_none() {
            self.switch_to(0)?;
        }
        self.set_paused(false)
    }

    pub fn toggle_pause(&mut self) -> Result<(), TimelineError> {
        if self.paused {
            self.play()
        } else {
            self.set_paused(true)
        }
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), TimelineError> {
        self.backend.set_paused(paused)?;
        self.paused = paused;
        Ok(())
    }

    pub fn frame_step(&mut self) -> Result<(), TimelineError> {
        if self.current.is_none() {
            self.switch_to(0)?;
        }
        self.backend.frame_step()?;
        self.paused = true;
        Ok(())
    }

    pub fn frame_back_step(&mut self) -> Result<(), TimelineError> {
        if self.current.is_none() {
            self.switch_to(0)?;
        }
        self.backend.frame_back_step()?;
        self.paused = true;
        Ok(())
    }

    /// Hand off to the next segment when the current one has ended.
    pub fn poll(&mut self) -> Result<TimelineEvent, TimelineError> {
        let Some(index) = self.current else {
            return Ok(TimelineEvent::Idle);
        };
        if self.finished || !self.backend.reached_end() {
            return Ok(TimelineEvent::Idle);
        }

        let next = index + 1;
        if next < self.map.len() {
            self.switch_to(next)?;
            info!(segment = next, "Advanced to next segment");
            Ok(TimelineEvent::Advanced(next))
        } else {
            self.set_paused(true)?;
            self.finished = true;
            info!("Reached end of recording");
            Ok(TimelineEvent::Finished)
        }
    }
}
