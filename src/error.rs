use chrono::NaiveDate;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CalendarError {
    #[error("validity window is empty: start {start} is after end {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },
    #[error("calendar.txt has no weekly patterns to derive a validity window from")]
    NoWeeklyPatterns,
    #[error("date arithmetic overflowed after {0}")]
    DateOverflow(NaiveDate),
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("required table is missing: {0}")]
    MissingTable(PathBuf),
}

/// Anything that stops a single generation from being processed.
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[derive(thiserror::Error, Debug)]
pub enum AlertError {
    #[error("failed to read alert snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode alert snapshot: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("scan step must be positive, got {0}")]
    InvalidStep(chrono::Duration),
}
