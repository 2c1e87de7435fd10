//! Paginated, incrementally filled item grid.
//!
//! The grid owns the ordered item collection. While loading, drained results
//! are appended in arrival order and laid out immediately. When the last
//! result arrives the collection is sorted by creation time once, ties broken
//! by path, and laid out from scratch.
//!
//! Paging while loading: the current page follows the growing tail until the
//! operator navigates away from the last page. Navigating back to the last
//! page resumes following. Completion clamps the current page to the final
//! page count.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use super::{LoadedItem, PageControls, RowItem, RowModel, SelectionModel};
use crate::layout::paged::{self, CellGeometry, Placement};
use crate::scanner::linked;
use crate::thumbnails::queue::{PreloadFailure, PreloadOutcome, ResultStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPhase {
    Loading,
    Complete,
}

/// What one `pump` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub loaded: usize,
    pub failed: usize,
    pub completed: bool,
}

pub struct GridModel {
    cell: CellGeometry,
    rows_per_page: usize,
    items_per_row: usize,
    items: Vec<LoadedItem>,
    failures: Vec<PreloadFailure>,
    placements: Vec<Placement>,
    stream: Option<ResultStream>,
    expected: usize,
    phase: GridPhase,
    current_page: usize,
    page_count: usize,
    following: bool,
}

impl GridModel {
    pub fn new(cell: CellGeometry, rows_per_page: usize, viewport_width: u32) -> Self {
        Self {
            cell,
            rows_per_page: rows_per_page.max(1),
            items_per_row: cell.items_per_row(viewport_width),
            items: Vec::new(),
            failures: Vec::new(),
            placements: Vec::new(),
            stream: None,
            expected: 0,
            phase: GridPhase::Complete,
            current_page: 1,
            page_count: 1,
            following: true,
        }
    }

    /// Start consuming a pipeline's results. Replaces any previous content.
    pub fn attach(&mut self, stream: ResultStream) {
        self.expected = stream.total();
        self.items = Vec::with_capacity(self.expected);
        self.failures.clear();
        self.current_page = 1;
        self.following = true;
        self.phase = GridPhase::Loading;
        self.stream = Some(stream);
        debug!(expected = self.expected, "Grid attached to result stream");

        if self.expected == 0 {
            self.finish();
        } else {
            self.relayout();
        }
    }

    /// Drain available results without blocking and lay out the batch.
    pub fn pump(&mut self) -> PumpReport {
        let Some(stream) = self.stream.as_mut() else {
            return PumpReport::default();
        };
        let batch = stream.poll_results();
        self.ingest(batch)
    }

    fn ingest(&mut self, batch: Vec<PreloadOutcome>) -> PumpReport {
        let mut report = PumpReport::default();
        if batch.is_empty() || self.phase == GridPhase::Complete {
            return report;
        }

        for outcome in batch {
            match outcome {
                Ok(result) => {
                    self.items.push(result.into());
                    report.loaded += 1;
                }
                Err(failure) => {
                    self.failures.push(failure);
                    report.failed += 1;
                }
            }
        }
        trace!(
            loaded = report.loaded,
            failed = report.failed,
            resolved = self.resolved(),
            "Ingested batch"
        );

        if self.resolved() >= self.expected {
            self.finish();
            report.completed = true;
        } else {
            self.relayout();
        }
        report
    }

    fn finish(&mut self) {
        // Path breaks timestamp ties so the final order ignores arrival order.
        self.items.sort_by(|a, b| {
            a.create_epoch
                .cmp(&b.create_epoch)
                .then_with(|| a.path().cmp(b.path()))
        });
        self.phase = GridPhase::Complete;
        self.stream = None;
        self.relayout();
        info!(
            loaded = self.items.len(),
            failed = self.failures.len(),
            pages = self.page_count,
            "Grid loading complete"
        );
    }

    /// Recompute every placement from the ordered collection.
    fn relayout(&mut self) {
        let (ipr, rpp) = (self.items_per_row, self.rows_per_page);
        self.placements = (0..self.items.len())
            .map(|index| paged::locate(index, ipr, rpp))
            .collect();
        self.page_count = paged::page_count(self.items.len(), ipr, rpp);

        if self.phase == GridPhase::Loading && self.following {
            self.current_page = self.page_count;
        } else {
            self.current_page = self.current_page.clamp(1, self.page_count);
        }
    }

    /// Returns whether the column count changed.
    pub fn on_viewport_resize(&mut self, width: u32) -> bool {
        let items_per_row = self.cell.items_per_row(width);
        if items_per_row == self.items_per_row {
            return false;
        }
        debug!(width, items_per_row, "Column count changed");
        self.items_per_row = items_per_row;
        self.relayout();
        true
    }

    /// Move by `delta` pages, clamped. Returns the new current page.
    pub fn switch_page(&mut self, delta: isize) -> usize {
        let target = self.current_page.saturating_add_signed(delta);
        self.current_page = target.clamp(1, self.page_count);
        if self.phase == GridPhase::Loading {
            self.following = self.current_page == self.page_count;
        }
        self.current_page
    }

    /// Flag items whose canonical path is a destination link target.
    pub fn mark_linked(&mut self, targets: &HashSet<PathBuf>) -> usize {
        for item in &mut self.items {
            item.linked = targets.contains(&linked::canonical(item.path()));
        }
        self.linked_count()
    }

    pub fn linked_count(&self) -> usize {
        self.items.iter().filter(|item| item.linked).count()
    }

    /// Rows of the current page with per-cell display state.
    pub fn visible_page(&self, selection: &SelectionModel) -> Vec<RowModel> {
        let range = paged::page_range(
            self.current_page,
            self.items.len(),
            self.items_per_row,
            self.rows_per_page,
        );
        let mut rows: Vec<RowModel> = Vec::new();
        for index in range {
            let item = &self.items[index];
            let placement = self.placements[index];
            let cell = RowItem {
                media_path: item.path().to_path_buf(),
                column: placement.column,
                create_epoch: item.create_epoch,
                read_only: item.descriptor.is_read_only(),
                degraded: item.degraded,
                linked: item.linked,
                selected: selection.contains(item.path()),
            };
            match rows.last_mut() {
                Some(row) if row.row_index == placement.row => row.items.push(cell),
                _ => rows.push(RowModel::new(placement.row, vec![cell])),
            }
        }
        rows
    }

    /// Items on the current page, in grid order.
    pub fn page_items(&self) -> &[LoadedItem] {
        let range = paged::page_range(
            self.current_page,
            self.items.len(),
            self.items_per_row,
            self.rows_per_page,
        );
        &self.items[range]
    }

    pub fn page_item(&self, position: usize) -> Option<&LoadedItem> {
        self.page_items().get(position)
    }

    pub fn page_controls(&self) -> PageControls {
        PageControls::new(self.current_page, self.page_count)
    }

    pub fn items(&self) -> &[LoadedItem] {
        &self.items
    }

    pub fn item(&self, path: &Path) -> Option<&LoadedItem> {
        self.items.iter().find(|item| item.path() == path)
    }

    pub fn placement(&self, index: usize) -> Option<Placement> {
        self.placements.get(index).copied()
    }

    pub fn failures(&self) -> &[PreloadFailure] {
        &self.failures
    }

    pub fn phase(&self) -> GridPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == GridPhase::Complete
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Workers currently inside a decode.
    pub fn busy_workers(&self) -> usize {
        self.stream
            .as_ref()
            .map_or(0, |stream| stream.active_worker_count())
    }

    /// Loaded plus failed.
    pub fn resolved(&self) -> usize {
        self.items.len() + self.failures.len()
    }

    pub fn items_per_row(&self) -> usize {
        self.items_per_row
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn is_following(&self) -> bool {
        self.following
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreloadError;
    use crate::models::SelectionModel;
    use crate::thumbnails::queue::tests::{descriptor, drain, FakeDecoder};
    use crate::thumbnails::queue::{PreloadPipeline, PreloadResult};
    use image::RgbImage;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    /// 212px cells; width 212 gives one column.
    const ONE_COLUMN: u32 = 212;

    fn ok(path: &str, epoch: Option<i64>) -> PreloadOutcome {
        Ok(PreloadResult {
            descriptor: descriptor(path),
            thumbnail: RgbImage::new(1, 1),
            create_epoch: epoch,
            degraded: false,
        })
    }

    fn failed(path: &str) -> PreloadOutcome {
        Err(PreloadFailure {
            descriptor: descriptor(path),
            error: PreloadError::MissingFile(path.into()),
        })
    }

    /// A grid in the loading phase expecting `n` results, fed by hand.
    fn loading_grid(n: usize, rows_per_page: usize, width: u32) -> GridModel {
        let mut grid = GridModel::new(CellGeometry::default(), rows_per_page, width);
        grid.expected = n;
        grid.phase = GridPhase::Loading;
        grid
    }

    fn pump_until_complete(grid: &mut GridModel) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !grid.is_complete() {
            assert!(Instant::now() < deadline, "grid did not complete");
            grid.pump();
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_pipeline_fills_grid_sorted() {
        let items: Vec<_> = (0..40)
            .map(|i| descriptor(&format!("/m/{}.jpg", (i * 37) % 40)))
            .collect();
        let stream = PreloadPipeline::builder()
            .workers(4)
            .build(Arc::new(FakeDecoder))
            .start(items);

        let mut grid = GridModel::new(CellGeometry::default(), 3, 1000);
        grid.attach(stream);
        pump_until_complete(&mut grid);

        assert_eq!(grid.items().len(), 40);
        let unique: HashSet<_> = grid.items().iter().map(|i| i.path().to_path_buf()).collect();
        assert_eq!(unique.len(), 40);
        assert!(grid
            .items()
            .windows(2)
            .all(|w| w[0].create_epoch <= w[1].create_epoch));
    }

    #[test]
    fn test_unknown_timestamps_sort_first() {
        let mut grid = loading_grid(4, 100, 1000);
        grid.ingest(vec![
            ok("/m/b", Some(20)),
            ok("/m/y", None),
            ok("/m/a", Some(10)),
            ok("/m/x", None),
        ]);
        let order: Vec<_> = grid.items().iter().map(|i| i.path().to_path_buf()).collect();
        assert_eq!(
            order,
            ["/m/x", "/m/y", "/m/a", "/m/b"].map(PathBuf::from).to_vec()
        );
    }

    #[test]
    fn test_final_order_ignores_arrival_order() {
        let final_order = |batches: Vec<Vec<PreloadOutcome>>| {
            let mut grid = loading_grid(4, 100, 1000);
            for batch in batches {
                grid.ingest(batch);
            }
            assert!(grid.is_complete());
            grid.items()
                .iter()
                .map(|i| i.path().to_path_buf())
                .collect::<Vec<_>>()
        };

        let first = final_order(vec![
            vec![ok("/m/x", None), ok("/m/burst-1", Some(5))],
            vec![ok("/m/y", None), ok("/m/burst-0", Some(5))],
        ]);
        let second = final_order(vec![
            vec![ok("/m/burst-0", Some(5)), ok("/m/y", None)],
            vec![ok("/m/burst-1", Some(5))],
            vec![ok("/m/x", None)],
        ]);

        assert_eq!(first, second);
        assert_eq!(
            first,
            ["/m/x", "/m/y", "/m/burst-0", "/m/burst-1"]
                .map(PathBuf::from)
                .to_vec()
        );
    }

    #[test]
    fn test_failures_count_toward_completion() {
        let mut grid = loading_grid(3, 100, 1000);
        let report = grid.ingest(vec![ok("/m/1", Some(1)), failed("/m/missing")]);
        assert!(!report.completed);
        assert_eq!(grid.phase(), GridPhase::Loading);

        let report = grid.ingest(vec![ok("/m/2", Some(2))]);
        assert!(report.completed);
        assert_eq!(grid.items().len(), 2);
        assert_eq!(grid.failures().len(), 1);
    }

    #[test]
    fn test_relayout_is_idempotent_and_pure() {
        let mut grid = loading_grid(50, 4, 1000);
        grid.ingest((0..30).map(|i| ok(&format!("/m/{i}"), Some(i))).collect());

        let before: Vec<_> = (0..30).map(|i| grid.placement(i).unwrap()).collect();
        grid.relayout();
        grid.relayout();
        let after: Vec<_> = (0..30).map(|i| grid.placement(i).unwrap()).collect();
        assert_eq!(before, after);

        let ipr = grid.items_per_row();
        for (index, placement) in after.iter().enumerate() {
            assert_eq!(placement.page, (index / ipr) / 4 + 1);
        }
    }

    #[test]
    fn test_follows_tail_until_operator_navigates() {
        // One item per page.
        let mut grid = loading_grid(10, 1, ONE_COLUMN);
        grid.ingest(vec![ok("/m/0", None), ok("/m/1", None), ok("/m/2", None)]);
        assert_eq!(grid.current_page(), 3);

        assert_eq!(grid.switch_page(-1), 2);
        assert!(!grid.is_following());
        grid.ingest(vec![ok("/m/3", None), ok("/m/4", None)]);
        assert_eq!(grid.current_page(), 2);
        assert_eq!(grid.page_count(), 5);

        // Back on the last page: following resumes.
        assert_eq!(grid.switch_page(10), 5);
        assert!(grid.is_following());
        grid.ingest(vec![ok("/m/5", None)]);
        assert_eq!(grid.current_page(), 6);
    }

    #[test]
    fn test_completion_clamps_manual_page() {
        let mut grid = loading_grid(4, 1, ONE_COLUMN);
        grid.ingest(vec![ok("/m/0", None), ok("/m/1", None), ok("/m/2", None)]);
        grid.switch_page(-1);
        assert_eq!(grid.current_page(), 2);

        grid.ingest(vec![ok("/m/3", None)]);
        assert!(grid.is_complete());
        assert_eq!(grid.current_page(), 2);

        // Widening collapses to one page; the current page follows.
        assert!(grid.on_viewport_resize(4000));
        assert_eq!(grid.page_count(), 1);
        assert_eq!(grid.current_page(), 1);
        assert!(!grid.page_controls().visible);
    }

    #[test]
    fn test_resize_recomputes_columns() {
        let mut grid = loading_grid(8, 100, 1000);
        grid.ingest((0..8).map(|i| ok(&format!("/m/{i}"), Some(i))).collect());
        assert_eq!(grid.items_per_row(), 4);
        assert_eq!(grid.placement(5).unwrap().row, 1);

        assert!(!grid.on_viewport_resize(1010));
        assert!(grid.on_viewport_resize(100));
        assert_eq!(grid.items_per_row(), 1);
        assert_eq!(grid.placement(5).unwrap().row, 5);
    }

    #[test]
    fn test_empty_stream_completes_immediately() {
        let stream = PreloadPipeline::builder()
            .build(Arc::new(FakeDecoder))
            .start(Vec::new());
        let mut grid = GridModel::new(CellGeometry::default(), 100, 1000);
        grid.attach(stream);
        assert!(grid.is_complete());
        assert!(grid.items().is_empty());
        assert!(!grid.page_controls().visible);
        assert!(grid.visible_page(&SelectionModel::new()).is_empty());
    }

    #[test]
    fn test_selection_survives_resort() {
        let mut grid = loading_grid(3, 100, 1000);
        let mut selection = SelectionModel::new();

        grid.ingest(vec![ok("/m/late", Some(300))]);
        selection.toggle(&grid.items()[0]);
        grid.ingest(vec![ok("/m/early", Some(100)), ok("/m/mid", Some(200))]);

        assert!(grid.is_complete());
        assert_eq!(grid.items()[2].path(), Path::new("/m/late"));
        assert!(selection.contains(Path::new("/m/late")));
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn test_visible_page_rows() {
        let mut grid = loading_grid(10, 2, 1000);
        grid.ingest((0..10).map(|i| ok(&format!("/m/{i:02}"), Some(i))).collect());
        let mut selection = SelectionModel::new();
        selection.toggle(&grid.items()[9]);

        // 4 per row, 2 rows per page: page 1 holds 0..8, page 2 holds 8..10.
        assert_eq!(grid.page_count(), 2);
        let controls = grid.page_controls();
        assert!(controls.visible && !controls.prev_enabled && controls.next_enabled);

        let rows = grid.visible_page(&selection);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].items.len(), 4);

        grid.switch_page(1);
        assert_eq!(grid.page_items().len(), 2);
        assert_eq!(grid.page_item(1).unwrap().path(), Path::new("/m/09"));
        assert!(grid.page_item(2).is_none());
        let rows = grid.visible_page(&selection);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].items.len(), 2);
        assert_eq!(rows[0].items[1].column, 1);
        assert!(rows[0].items[1].selected);
        assert!(!grid.page_controls().next_enabled);
    }

    #[cfg(unix)]
    #[test]
    fn test_mark_linked() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let mut grid = loading_grid(2, 100, 1000);
        grid.ingest(vec![
            ok(a.to_str().unwrap(), Some(1)),
            ok(b.to_str().unwrap(), Some(2)),
        ]);
        let targets: HashSet<PathBuf> = [linked::canonical(&b)].into_iter().collect();
        assert_eq!(grid.mark_linked(&targets), 1);
        assert!(grid.item(&b).unwrap().linked);
        assert!(!grid.item(&a).unwrap().linked);
    }

    #[test]
    fn test_drain_helper_matches_grid_totals() {
        let mut stream = PreloadPipeline::builder()
            .workers(2)
            .build(Arc::new(FakeDecoder))
            .start(vec![descriptor("/m/1.jpg"), descriptor("/m/missing.jpg")]);
        let results = drain(&mut stream);
        let mut grid = loading_grid(2, 100, 1000);
        let report = grid.ingest(results);
        assert_eq!((report.loaded, report.failed, report.completed), (1, 1, true));
    }
}
