use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::task;

use crate::records::{cell_value, Record, COLUMNS};

/// Rows converted per chunk; control yields to the event loop between
/// chunks so a large export never freezes everything else.
pub const EXPORT_CHUNK_ROWS: usize = 5000;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: the result buffer is empty")]
    EmptyBuffer,

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Quotes one CSV field, doubling embedded quotes.
pub fn csv_field(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Header row: the exported column names, in table order.
pub fn header_line() -> String {
    COLUMNS
        .iter()
        .map(|c| csv_field(c.header))
        .collect::<Vec<_>>()
        .join(",")
}

/// Chunk boundaries for a buffer of `total` rows.
pub fn chunk_spans(total: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::with_capacity(total.div_ceil(EXPORT_CHUNK_ROWS));
    let mut start = 0;
    while start < total {
        let end = (start + EXPORT_CHUNK_ROWS).min(total);
        spans.push(start..end);
        start = end;
    }
    spans
}

fn row_line(serial: usize, record: &Record) -> String {
    COLUMNS
        .iter()
        .map(|c| csv_field(&cell_value(record, c.source, serial)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Serializes the full buffer to CSV text: header first, then every row,
/// newline-joined, converted in [`EXPORT_CHUNK_ROWS`] batches with a yield
/// between them.
pub async fn render_csv(records: &[Record]) -> Result<String, ExportError> {
    if records.is_empty() {
        return Err(ExportError::EmptyBuffer);
    }

    let mut lines: Vec<String> = Vec::with_capacity(records.len() + 1);
    lines.push(header_line());
    for span in chunk_spans(records.len()) {
        for (offset, record) in records[span.clone()].iter().enumerate() {
            lines.push(row_line(span.start + offset + 1, record));
        }
        task::yield_now().await;
    }
    Ok(lines.join("\n"))
}

/// `final_report_<timestamp>.csv` for the given moment.
pub fn default_filename(now: &DateTime<Local>) -> String {
    format!("final_report_{}.csv", now.format("%Y%m%d%H%M%S"))
}

/// Renders and writes the buffer to `path`. The handle is flushed and
/// dropped before returning, so repeated exports hold nothing open.
pub async fn export_to_path(records: &[Record], path: &Path) -> Result<(), ExportError> {
    let csv = render_csv(records).await?;
    let display_path = path.display().to_string();
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|source| ExportError::Write {
            path: display_path.clone(),
            source,
        })?;
    outfile
        .write_all(csv.as_bytes())
        .await
        .map_err(|source| ExportError::Write {
            path: display_path.clone(),
            source,
        })?;
    outfile.flush().await.map_err(|source| ExportError::Write {
        path: display_path,
        source,
    })?;
    Ok(())
}
