use tokio::task;

use crate::records::{cell_value, Record, COLUMNS};

/// Rows rendered synchronously when a result set is first displayed.
pub const INITIAL_ROWS: usize = 1000;

/// During loading, the table is only rebuilt when the loaded count crosses
/// a multiple of this stride (or is still small, or loading finished).
pub const CHECKPOINT_STRIDE: usize = 5000;

/// Rows appended per scroll trigger once loading is done.
pub const SCROLL_CHUNK: usize = 500;

/// Scroll proximity to the bottom of the container that triggers an append.
pub const SCROLL_PROXIMITY_PX: f64 = 200.0;

/// Display-only columns appended after the exported set. Never part of the
/// CSV.
const INTERACTIVE_HEADERS: [&str; 2] = ["Play", "All Recordings"];

/// Receives rendered content. The policies in [`TableView`] decide *when*
/// to render; implementations only decide *where* the cells go.
pub trait Surface {
    /// Replace the visible table with a header and an initial row set.
    fn rebuild(&mut self, header: &[String], rows: &[Vec<String>]);

    /// Extend the visible table with more rows.
    fn append(&mut self, rows: &[Vec<String>]);
}

/// Header cells for the displayed table: the exported columns plus the two
/// interactive recording columns.
pub fn display_header() -> Vec<String> {
    COLUMNS
        .iter()
        .map(|c| c.header.to_string())
        .chain(INTERACTIVE_HEADERS.iter().map(|h| h.to_string()))
        .collect()
}

/// Pure record-to-cells mapping for one displayed row. `serial` is 1-based.
pub fn display_row(serial: usize, record: &Record) -> Vec<String> {
    let mut cells: Vec<String> = COLUMNS
        .iter()
        .map(|c| cell_value(record, c.source, serial))
        .collect();
    let has_recording = record
        .get("recording_id")
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    let has_call = record
        .get("call_id")
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    cells.push(if has_recording { "[play]".to_string() } else { String::new() });
    cells.push(if has_call { "[list]".to_string() } else { String::new() });
    cells
}

/// Scroll geometry of the container showing the table.
#[derive(Clone, Copy, Debug)]
pub struct Viewport {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl Viewport {
    /// Degenerate viewport that is already at its bottom; used by callers
    /// that page through the whole result set without real scroll input.
    pub fn at_bottom() -> Self {
        Self {
            scroll_top: 0.0,
            viewport_height: 0.0,
            content_height: 0.0,
        }
    }

    pub fn near_bottom(&self) -> bool {
        self.content_height - (self.scroll_top + self.viewport_height) <= SCROLL_PROXIMITY_PX
    }
}

/// Decides whether a data arrival warrants a full table rebuild. Rebuilding
/// on every batch does not scale, so rebuilds happen only while the table
/// is still small, when the count crosses a [`CHECKPOINT_STRIDE`] boundary,
/// and when loading completes.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckpointPolicy {
    last_rebuild_total: usize,
}

impl CheckpointPolicy {
    pub fn should_rebuild(&mut self, total_loaded: usize, complete: bool) -> bool {
        let crossed_stride =
            total_loaded / CHECKPOINT_STRIDE > self.last_rebuild_total / CHECKPOINT_STRIDE;
        if complete || total_loaded <= INITIAL_ROWS || crossed_stride {
            self.last_rebuild_total = total_loaded;
            return true;
        }
        false
    }
}

/// Incremental table: initial slice synchronously, checkpointed rebuilds
/// while a load streams in, scroll-triggered appends afterwards.
pub struct TableView<S> {
    surface: S,
    shown: usize,
    checkpoints: CheckpointPolicy,
    loading_more: bool,
}

impl<S: Surface> TableView<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            shown: 0,
            checkpoints: CheckpointPolicy::default(),
            loading_more: false,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn shown(&self) -> usize {
        self.shown
    }

    /// Clears and rebuilds the table: header plus the first
    /// [`INITIAL_ROWS`] rows. The rest stays reachable through
    /// [`TableView::on_scroll`].
    pub fn display(&mut self, records: &[Record]) {
        let initial = records.len().min(INITIAL_ROWS);
        let rows: Vec<Vec<String>> = records[..initial]
            .iter()
            .enumerate()
            .map(|(i, r)| display_row(i + 1, r))
            .collect();
        self.surface.rebuild(&display_header(), &rows);
        self.shown = initial;
        self.loading_more = false;
    }

    /// Called after each merged batch while loading. Rebuilds only at
    /// checkpoints; between them the table intentionally lags the buffer.
    pub fn on_batch(&mut self, records: &[Record], complete: bool) {
        if self.checkpoints.should_rebuild(records.len(), complete) {
            self.display(records);
        }
    }

    /// Scroll handler for the loaded result set. Appends at most
    /// [`SCROLL_CHUNK`] rows when the viewport is near the bottom, after a
    /// zero-delay yield so one scroll event never turns into a long
    /// synchronous render. The latch keeps re-entrant triggers from
    /// overlapping. Returns the number of rows appended.
    pub async fn on_scroll(&mut self, viewport: Viewport, records: &[Record]) -> usize {
        if self.loading_more || !viewport.near_bottom() || self.shown >= records.len() {
            return 0;
        }
        self.loading_more = true;
        task::yield_now().await;

        let start = self.shown;
        let end = (start + SCROLL_CHUNK).min(records.len());
        let rows: Vec<Vec<String>> = records[start..end]
            .iter()
            .enumerate()
            .map(|(i, r)| display_row(start + i + 1, r))
            .collect();
        self.surface.append(&rows);
        self.shown = end;
        self.loading_more = false;
        end - start
    }
}
