//! libmpv playback backend for [`VideoTimeline`](super::timeline::VideoTimeline).
//!
//! mpv opens its own output window. One instance is kept for the lifetime of
//! the timeline and segments are swapped with `loadfile replace`.

use std::path::Path;

use libmpv2::Mpv;
use tracing::{debug, info};

use super::timeline::PlaybackBackend;
use crate::error::TimelineError;

fn backend_error(e: libmpv2::Error) -> TimelineError {
    TimelineError::Backend(e.to_string())
}

pub struct MpvBackend {
    mpv: Mpv,
}

impl MpvBackend {
    pub fn new() -> Result<Self, TimelineError> {
        let mpv = Mpv::with_initializer(|init| {
            init.set_option("hwdec", "auto-safe")?;
            // Stay on the last frame so eof-reached becomes observable.
            init.set_option("keep-open", "yes")?;
            init.set_option("pause", "yes")?;
            init.set_option("osd-level", 0i64)?;
            init.set_option("terminal", false)?;
            init.set_option("input-default-bindings", false)?;
            init.set_option("msg-level", "all=warn")?;
            Ok(())
        })
        .map_err(backend_error)?;

        info!("mpv backend initialized");
        Ok(Self { mpv })
    }
}

impl PlaybackBackend for MpvBackend {
    fn load(&mut self, path: &Path) -> Result<(), TimelineError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| TimelineError::Backend(format!("non UTF-8 path: {path:?}")))?;
        self.mpv
            .command("loadfile", &[path_str, "replace"])
            .map_err(backend_error)?;
        debug!(?path, "Loaded segment");
        Ok(())
    }

    fn position(&self) -> Option<f64> {
        self.mpv.get_property::<f64>("time-pos").ok()
    }

    fn seek(&mut self, seconds: f64) -> Result<(), TimelineError> {
        let pos_str = format!("{seconds:.3}");
        self.mpv
            .command("seek", &[&pos_str, "absolute"])
            .map_err(backend_error)
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), TimelineError> {
        self.mpv.set_property("pause", paused).map_err(backend_error)
    }

    fn frame_step(&mut self) -> Result<(), TimelineError> {
        self.mpv.command("frame-step", &[]).map_err(backend_error)
    }

    fn frame_back_step(&mut self) -> Result<(), TimelineError> {
        self.mpv
            .command("frame-back-step", &[])
            .map_err(backend_error)
    }

    fn reached_end(&self) -> bool {
        self.mpv.get_property::<bool>("eof-reached").unwrap_or(false)
    }
}
