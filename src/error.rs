use std::path::PathBuf;

use thiserror::Error;

/// Rejected field value on a film. Local to one record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid Film.id value {0} (must be positive)")]
    InvalidId(i64),

    #[error("Invalid Film.releaseYear value {year} (valid range {min}..={max})")]
    ReleaseYearOutOfRange { year: i32, min: i32, max: i32 },

    #[error("Invalid Film.avgScore value {0} (valid range 0..=10)")]
    AvgScoreOutOfRange(f32),

    #[error("Duplicate Film.id {0} in the working set")]
    DuplicateId(u64),

    #[error("Malformed seed row: {0}")]
    MalformedRow(String),
}

/// Failure fetching one attribute from the external source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("host unreachable for {url}: {reason}")]
    HostUnreachable { url: String, reason: String },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

impl FetchError {
    /// Systemic failures mean the source itself is gone, not just this page.
    pub fn is_systemic(&self) -> bool {
        matches!(self, FetchError::HostUnreachable { .. })
    }
}

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Failed to open seed file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported seed format '{0}' (expected .csv, .xlsx, .sqlite or .db)")]
    UnsupportedFormat(PathBuf),

    #[error("Workbook '{0}' has no worksheet")]
    NoWorksheet(PathBuf),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid status transition {from} -> {to}")]
pub struct StatusError {
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("No films could be loaded from '{source_id}' in rows {start}..{end}")]
    EmptyWorkingSet {
        source_id: String,
        start: usize,
        end: usize,
    },

    #[error("Film {0} not found in the working set")]
    NotFound(u64),

    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
