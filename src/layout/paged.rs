//! Fixed-cell paged grid geometry.
//!
//! Every function here is pure: placement depends only on the linear index,
//! the column count and the rows per page.

/// Default thumbnail box.
pub const DEFAULT_THUMB_WIDTH: u32 = 180;
pub const DEFAULT_THUMB_HEIGHT: u32 = 180;
pub const DEFAULT_BORDER: u32 = 6;
pub const DEFAULT_PADDING: u32 = 10;
pub const DEFAULT_ROWS_PER_PAGE: usize = 100;

/// Size of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellGeometry {
    pub thumb_width: u32,
    pub border: u32,
    pub padding: u32,
}

impl Default for CellGeometry {
    fn default() -> Self {
        Self {
            thumb_width: DEFAULT_THUMB_WIDTH,
            border: DEFAULT_BORDER,
            padding: DEFAULT_PADDING,
        }
    }
}

impl CellGeometry {
    pub fn outer_width(&self) -> u32 {
        self.thumb_width + 2 * self.border + 2 * self.padding
    }

    /// Columns that fit in `viewport_width`, never less than one.
    pub fn items_per_row(&self, viewport_width: u32) -> usize {
        let cell = self.outer_width().max(1);
        ((viewport_width / cell) as usize).max(1)
    }
}

/// Where one item lands. `page` is 1-based, row and column 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub page: usize,
    pub row: usize,
    pub column: usize,
}

pub fn locate(index: usize, items_per_row: usize, rows_per_page: usize) -> Placement {
    let items_per_row = items_per_row.max(1);
    let rows_per_page = rows_per_page.max(1);
    let global_row = index / items_per_row;
    Placement {
        page: global_row / rows_per_page + 1,
        row: global_row % rows_per_page,
        column: index % items_per_row,
    }
}

/// Pages needed for `count` items. An empty grid still has one page.
pub fn page_count(count: usize, items_per_row: usize, rows_per_page: usize) -> usize {
    if count == 0 {
        return 1;
    }
    locate(count - 1, items_per_row, rows_per_page).page
}

/// Index range of the items on `page`.
pub fn page_range(
    page: usize,
    count: usize,
    items_per_row: usize,
    rows_per_page: usize,
) -> std::ops::Range<usize> {
    let per_page = items_per_row.max(1) * rows_per_page.max(1);
    let start = page.saturating_sub(1).saturating_mul(per_page).min(count);
    let end = start.saturating_add(per_page).min(count);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_per_row_default_cell() {
        let cell = CellGeometry::default();
        assert_eq!(cell.outer_width(), 212);
        assert_eq!(cell.items_per_row(1000), 4);
        assert_eq!(cell.items_per_row(212), 1);
    }

    #[test]
    fn test_items_per_row_clamps_to_one() {
        let cell = CellGeometry::default();
        assert_eq!(cell.items_per_row(50), 1);
        assert_eq!(cell.items_per_row(0), 1);
    }

    #[test]
    fn test_locate_matches_formula() {
        for index in 0..2000 {
            let p = locate(index, 7, 10);
            assert_eq!(p.page, (index / 7) / 10 + 1);
            assert_eq!(p.row, (index / 7) % 10);
            assert_eq!(p.column, index % 7);
        }
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 4, 100), 1);
        assert_eq!(page_count(400, 4, 100), 1);
        assert_eq!(page_count(401, 4, 100), 2);
    }

    #[test]
    fn test_page_range_last_page_is_partial() {
        assert_eq!(page_range(1, 10, 2, 2), 0..4);
        assert_eq!(page_range(3, 10, 2, 2), 8..10);
        assert_eq!(page_range(4, 10, 2, 2), 10..10);
    }
}
