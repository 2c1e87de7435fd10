//! Headless application driver.
//!
//! Lists the sources, preloads every item into the grid while draining on a
//! fixed tick, then reports the loaded grid. With `--console` operator
//! commands are applied on the same tick, during loading and after it. With
//! `--play` the chosen recording is assembled into a timeline and played.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use flume::Receiver;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::console::{self, GridCommand};
use crate::gnss::tiles::TileSource;
use crate::layout::paged::DEFAULT_THUMB_HEIGHT;
use crate::models::{Gesture, GridModel, SelectionModel};
use crate::scanner::catalog::CatalogClient;
use crate::scanner::linked;
use crate::scanner::metadata::{ExifTool, TimestampResolver};
use crate::thumbnails::decoder::{MediaDecoder, StandardDecoder};
use crate::thumbnails::generator::ThumbBox;
use crate::thumbnails::queue::PreloadPipeline;
use crate::video::probe::VideoProbe;
use crate::video::timeline::SegmentMap;

/// Drain cadence of the control loop.
pub const TICK: Duration = Duration::from_millis(16);

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

pub struct MediaLinkApp {
    config: Config,
    catalog: CatalogClient,
}

impl MediaLinkApp {
    pub fn new(config: Config) -> Self {
        let catalog = CatalogClient::new(&config.catalog).with_timeout(config.catalog_timeout);
        Self { config, catalog }
    }

    pub fn run(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        let mut selection = SelectionModel::new();
        selection.connect_changed(|count| debug!(count, "Selection changed"));
        let mut console = self.config.console.then(|| {
            GridConsole::new(
                console::spawn_stdin_reader(),
                ExifTool::new(&self.config.exiftool, self.config.decode_timeout),
            )
        });

        let mut grid = self.load(&runtime, &mut selection, console.as_mut())?;
        report(&grid, &selection);

        if let Some(console) = console.as_mut() {
            runtime.block_on(console.interact(&mut grid, &mut selection));
        }

        if let Some(file) = &self.config.play {
            let map = self.segments_for(&runtime, &grid, file)?;
            let input = console.map(|c| c.input);
            self.play(&runtime, map, input)?;
        }
        Ok(())
    }

    fn video_probe(&self) -> VideoProbe {
        VideoProbe::new(
            &self.config.ffmpeg,
            &self.config.ffprobe,
            self.config.decode_timeout,
        )
    }

    fn decoder(&self) -> Result<Arc<dyn MediaDecoder>> {
        let config = &self.config;
        let tiles = TileSource::new(config.offline, config.map_database.as_deref())?;
        let exiftool = ExifTool::new(&config.exiftool, config.decode_timeout);
        Ok(Arc::new(StandardDecoder::new(
            ThumbBox::new(config.cell.thumb_width, DEFAULT_THUMB_HEIGHT),
            self.video_probe(),
            Arc::new(tiles),
            TimestampResolver::new(Some(exiftool)),
        )))
    }

    /// List, preload and sort every item; mark the ones already linked.
    pub fn load(
        &self,
        runtime: &Runtime,
        selection: &mut SelectionModel,
        console: Option<&mut GridConsole>,
    ) -> Result<GridModel> {
        let config = &self.config;
        info!(
            sources = config.sources.len(),
            destinations = config.destinations.len(),
            "Loading sources"
        );

        let descriptors = runtime
            .block_on(self.catalog.list_sources(&config.sources))
            .context("Failed to load sources")?;

        let destinations = config.destinations.clone();
        let link_scan = runtime.spawn_blocking(move || linked::scan_link_targets(&destinations));

        // Built outside the runtime: the tile client must not be created or
        // dropped on an async thread.
        let stream = PreloadPipeline::builder()
            .workers(config.jobs)
            .build(self.decoder()?)
            .start(descriptors);

        let mut grid = GridModel::new(config.cell, config.rows_per_page, config.viewport_width);
        grid.attach(stream);
        runtime.block_on(drain(&mut grid, selection, console));

        let targets = runtime
            .block_on(link_scan)
            .context("Link scan task failed")?;
        grid.mark_linked(&targets);
        Ok(grid)
    }

    /// Segment map of the multi-part recording containing `file`.
    pub fn segments_for(
        &self,
        runtime: &Runtime,
        grid: &GridModel,
        file: &Path,
    ) -> Result<SegmentMap> {
        let wanted = linked::canonical(file);
        let Some(item) = grid
            .items()
            .iter()
            .find(|item| linked::canonical(item.path()) == wanted)
        else {
            bail!("Not a loaded item: {}", file.display());
        };
        let descriptor = &item.descriptor;
        let source = self
            .config
            .sources
            .get(descriptor.source_index)
            .context("Item refers to an unknown source")?;

        let related = if descriptor.is_multi_part() {
            runtime
                .block_on(self.catalog.related(
                    &descriptor.file_path,
                    descriptor.source_index,
                    source,
                ))
                .with_context(|| format!("Failed to resolve parts of {}", file.display()))?
        } else {
            Vec::new()
        };

        let probe = self.video_probe();
        let map = SegmentMap::build(descriptor, &related, |path| probe.duration(path))?;
        info!(segments = map.len(), total = map.total(), "Built timeline");
        Ok(map)
    }

    #[cfg(feature = "mpv")]
    fn play(&self, runtime: &Runtime, map: SegmentMap, input: Option<Receiver<String>>) -> Result<()> {
        use crate::console::PlayerCommand;
        use crate::video::player::MpvBackend;
        use crate::video::timeline::{TimelineEvent, VideoTimeline};

        let mut timeline = VideoTimeline::new(map, MpvBackend::new()?)?
            .with_load_timeout(self.config.decode_timeout);
        timeline.play()?;

        runtime.block_on(async {
            let mut tick = tokio::time::interval(TICK);
            let mut last_report = Instant::now();
            loop {
                tick.tick().await;

                for line in input.iter().flat_map(|rx| rx.try_iter()) {
                    let command = match PlayerCommand::parse(&line) {
                        Ok(command) => command,
                        Err(e) => {
                            warn!("{e:#}");
                            continue;
                        }
                    };
                    match command {
                        PlayerCommand::TogglePause => timeline.toggle_pause()?,
                        PlayerCommand::StepForward => timeline.frame_step()?,
                        PlayerCommand::StepBack => timeline.frame_back_step()?,
                        PlayerCommand::Seek(t) => {
                            timeline.scrub_to(t)?;
                        }
                        PlayerCommand::Quit => return Ok(()),
                    }
                    info!(
                        paused = timeline.is_paused(),
                        segment = ?timeline.current_segment(),
                        position = %format!("{:.2}", timeline.position()),
                        "Player"
                    );
                }

                match timeline.poll()? {
                    TimelineEvent::Advanced(segment) => info!(segment, "Segment hand-off"),
                    TimelineEvent::Finished => break,
                    TimelineEvent::Idle => {}
                }
                if last_report.elapsed() >= PROGRESS_INTERVAL {
                    info!(
                        position = %format!("{:.1}", timeline.position()),
                        total = %format!("{:.1}", timeline.total()),
                        "Playing"
                    );
                    last_report = Instant::now();
                }
            }
            Ok::<_, anyhow::Error>(())
        })
    }

    #[cfg(not(feature = "mpv"))]
    fn play(&self, _runtime: &Runtime, map: SegmentMap, _input: Option<Receiver<String>>) -> Result<()> {
        warn!("Built without the mpv feature; listing segments only");
        for (index, segment) in map.segments().iter().enumerate() {
            info!(
                index,
                path = ?segment.path,
                start = segment.start,
                end = segment.end,
                "Segment"
            );
        }
        Ok(())
    }
}

fn log_counters(grid: &GridModel, selection: &SelectionModel) {
    info!(
        "Total: {} Linked: {} Selected: {}",
        grid.items().len(),
        grid.linked_count(),
        selection.len()
    );
}

fn log_page(grid: &GridModel, selection: &SelectionModel) {
    let controls = grid.page_controls();
    if controls.visible {
        info!(
            page = %controls.label(),
            prev = controls.prev_enabled,
            next = controls.next_enabled,
            following = grid.is_following(),
            "Pagination"
        );
    }
    for row in grid.visible_page(selection) {
        let cells: Vec<String> = row
            .items
            .iter()
            .map(|cell| {
                let name = cell
                    .media_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mark = match (cell.selected, cell.linked, cell.read_only) {
                    (true, _, _) => "*",
                    (_, true, _) => "=",
                    (_, _, true) => "-",
                    _ => "",
                };
                format!("{mark}{name}")
            })
            .collect();
        info!(row = row.row_index, items = ?cells, "Row");
    }
}

fn report(grid: &GridModel, selection: &SelectionModel) {
    for failure in grid.failures() {
        warn!(path = ?failure.descriptor.file_path, error = %failure.error, "Item failed to load");
    }
    log_counters(grid, selection);
    log_page(grid, selection);
}

/// Operator input for the grid and the state of the gesture it drives.
pub struct GridConsole {
    input: Receiver<String>,
    gesture: Gesture,
    exiftool: ExifTool,
    quit: bool,
}

impl GridConsole {
    pub fn new(input: Receiver<String>, exiftool: ExifTool) -> Self {
        Self {
            input,
            gesture: Gesture::new(),
            exiftool,
            quit: false,
        }
    }

    /// Apply every line received since the last tick.
    fn process(&mut self, grid: &mut GridModel, selection: &mut SelectionModel) {
        while let Ok(line) = self.input.try_recv() {
            match GridCommand::parse(&line) {
                Ok(command) => self.apply(command, grid, selection),
                Err(e) => warn!("{e:#}"),
            }
        }
    }

    fn closed(&self) -> bool {
        self.input.is_disconnected() && self.input.is_empty()
    }

    /// Keep applying commands after loading until quit or end of input.
    async fn interact(&mut self, grid: &mut GridModel, selection: &mut SelectionModel) {
        let mut tick = tokio::time::interval(TICK);
        while !self.quit && !self.closed() {
            tick.tick().await;
            self.process(grid, selection);
        }
    }

    fn apply(&mut self, command: GridCommand, grid: &mut GridModel, selection: &mut SelectionModel) {
        debug!(?command, "Console command");
        match command {
            GridCommand::NextPage => {
                grid.switch_page(1);
                log_page(grid, selection);
            }
            GridCommand::PrevPage => {
                grid.switch_page(-1);
                log_page(grid, selection);
            }
            GridCommand::Resize(width) => {
                if grid.on_viewport_resize(width) {
                    log_page(grid, selection);
                }
            }
            GridCommand::Toggle(position) => {
                if let Some(item) = grid.page_item(position) {
                    selection.toggle(item);
                }
            }
            GridCommand::Range(anchor, target) => {
                if let (Some(a), Some(b)) = (grid.page_item(anchor), grid.page_item(target)) {
                    selection.press(&mut self.gesture, a, false, grid.items());
                    self.gesture.release();
                    selection.press(&mut self.gesture, b, true, grid.items());
                    self.gesture.release();
                }
            }
            GridCommand::Drag(start, end) => {
                let page = grid.page_items();
                if start < page.len() && end < page.len() {
                    selection.press(&mut self.gesture, &page[start], false, grid.items());
                    let path: Vec<usize> = if start <= end {
                        (start..=end).collect()
                    } else {
                        (end..=start).rev().collect()
                    };
                    for position in path {
                        selection.drag_over(&mut self.gesture, &page[position]);
                    }
                    self.gesture.release();
                }
            }
            GridCommand::SelectAll => selection.select_all(grid.items()),
            GridCommand::Clear => selection.clear(),
            GridCommand::Invert => selection.invert(grid.items()),
            GridCommand::List => log_page(grid, selection),
            GridCommand::Metadata(position) => {
                if let Some(item) = grid.page_item(position) {
                    self.show_metadata(item.descriptor.metadata_path());
                }
            }
            GridCommand::Quit => {
                if !grid.is_complete() {
                    info!("Leaving once loading completes");
                }
                self.quit = true;
            }
        }
        log_counters(grid, selection);
    }

    fn show_metadata(&self, path: &Path) {
        match self.exiftool.read(path) {
            Ok(metadata) => {
                for (label, value) in metadata.display_rows() {
                    info!("{label}: {value}");
                }
            }
            Err(e) => warn!(?path, error = %e, "No metadata"),
        }
    }
}

/// Pump the grid on the control tick until every result is in.
async fn drain(
    grid: &mut GridModel,
    selection: &mut SelectionModel,
    mut console: Option<&mut GridConsole>,
) {
    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut tick = tokio::time::interval(TICK);

    while !grid.is_complete() {
        tick.tick().await;
        grid.pump();
        if let Some(console) = console.as_deref_mut() {
            console.process(grid, selection);
        }
        if last_report.elapsed() >= PROGRESS_INTERVAL {
            info!(
                resolved = grid.resolved(),
                expected = grid.expected(),
                busy = grid.busy_workers(),
                page = grid.current_page(),
                "Loading"
            );
            last_report = Instant::now();
        }
    }

    info!(elapsed = ?started.elapsed(), "Preload finished");
}
