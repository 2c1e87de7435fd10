use std::path::PathBuf;

/// One cell of a rendered page row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowItem {
    pub media_path: PathBuf,
    pub column: usize,
    pub create_epoch: Option<i64>,
    pub read_only: bool,
    pub degraded: bool,
    pub linked: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowModel {
    pub row_index: usize,
    pub items: Vec<RowItem>,
}

impl RowModel {
    pub fn new(row_index: usize, items: Vec<RowItem>) -> Self {
        Self { row_index, items }
    }
}

/// Pagination control state derived from the current page and page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageControls {
    pub visible: bool,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    pub current: usize,
    pub total: usize,
}

impl PageControls {
    pub fn new(current: usize, total: usize) -> Self {
        Self {
            visible: total > 1,
            prev_enabled: current > 1,
            next_enabled: current < total,
            current,
            total,
        }
    }

    pub fn label(&self) -> String {
        format!("Page {} of {}", self.current, self.total)
    }
}
