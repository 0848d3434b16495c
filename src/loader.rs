//! Reads GTFS generation directories into owned [`Snapshot`]s.
//!
//! Only the tables the calendar resolver needs are read: `calendar.txt`,
//! `calendar_dates.txt`, `feed_info.txt` and `trips.txt`.

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::LoadError;
use crate::model::{CalendarException, ExceptionKind, FeedWindow, TripRecord, WeeklyPattern};

const GTFS_DATE_FORMAT: &str = "%Y%m%d";

/// A generation directory, identified by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub label: String,
    pub path: PathBuf,
}

/// Tables of one generation, held for the duration of its processing.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub label: String,
    pub feed_window: FeedWindow,
    pub patterns: Vec<WeeklyPattern>,
    pub exceptions: Vec<CalendarException>,
    pub trips: Vec<TripRecord>,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    service_id: String,
    #[serde(deserialize_with = "deserialize_flag")]
    monday: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    tuesday: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    wednesday: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    thursday: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    friday: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    saturday: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    sunday: bool,
    #[serde(deserialize_with = "deserialize_gtfs_date")]
    start_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_gtfs_date")]
    end_date: NaiveDate,
}

impl From<CalendarRow> for WeeklyPattern {
    fn from(row: CalendarRow) -> Self {
        WeeklyPattern {
            service_id: row.service_id,
            start_date: row.start_date,
            end_date: row.end_date,
            days: [
                row.monday,
                row.tuesday,
                row.wednesday,
                row.thursday,
                row.friday,
                row.saturday,
                row.sunday,
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarDateRow {
    service_id: String,
    #[serde(deserialize_with = "deserialize_gtfs_date")]
    date: NaiveDate,
    exception_type: ExceptionKind,
}

#[derive(Debug, Deserialize)]
struct FeedInfoRow {
    #[serde(default, deserialize_with = "deserialize_optional_gtfs_date")]
    feed_start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_gtfs_date")]
    feed_end_date: Option<NaiveDate>,
}

fn deserialize_gtfs_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let date_str = String::deserialize(deserializer)?;
    NaiveDate::parse_from_str(&date_str, GTFS_DATE_FORMAT).map_err(serde::de::Error::custom)
}

fn deserialize_optional_gtfs_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let date_str = String::deserialize(deserializer)?;
    if date_str.is_empty() {
        Ok(None)
    } else {
        NaiveDate::parse_from_str(&date_str, GTFS_DATE_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match String::deserialize(deserializer)?.as_str() {
        "1" => Ok(true),
        "0" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected weekday flag 0 or 1, got '{other}'"
        ))),
    }
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: T = result.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    debug!(path = %path.display(), rows = rows.len(), "Table read");
    Ok(rows)
}

fn read_required<T: DeserializeOwned>(dir: &Path, table: &str) -> Result<Vec<T>, LoadError> {
    let path = dir.join(format!("{table}.txt"));
    if !path.exists() {
        return Err(LoadError::MissingTable(path));
    }
    read_table(&path)
}

fn read_optional<T: DeserializeOwned>(dir: &Path, table: &str) -> Result<Vec<T>, LoadError> {
    let path = dir.join(format!("{table}.txt"));
    if !path.exists() {
        debug!(path = %path.display(), "Optional table absent");
        return Ok(Vec::new());
    }
    read_table(&path)
}

/// Lists the generation directories under `base_dir`, sorted by name.
pub fn list_generations(base_dir: &Path) -> Result<Vec<Generation>, LoadError> {
    let io_err = |source: std::io::Error| LoadError::Io {
        path: base_dir.to_path_buf(),
        source,
    };

    let mut generations = Vec::new();
    for entry in fs::read_dir(base_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        let Some(label) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        generations.push(Generation {
            label,
            path: entry.path(),
        });
    }

    generations.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(generations)
}

/// Reads the tables of one generation.
///
/// # Errors
///
/// Fails when `calendar.txt` or `trips.txt` is missing, or any table read is
/// malformed. `calendar_dates.txt` and `feed_info.txt` may be absent.
#[tracing::instrument(skip(generation), fields(generation = %generation.label))]
pub fn load_snapshot(generation: &Generation) -> Result<Snapshot, LoadError> {
    let dir = generation.path.as_path();

    let patterns: Vec<WeeklyPattern> = read_required::<CalendarRow>(dir, "calendar")?
        .into_iter()
        .map(WeeklyPattern::from)
        .collect();

    let exceptions = read_optional::<CalendarDateRow>(dir, "calendar_dates")?
        .into_iter()
        .map(|row| CalendarException {
            service_id: row.service_id,
            date: row.date,
            kind: row.exception_type,
        })
        .collect::<Vec<_>>();

    // feed_info.txt should hold a single row; when it has more, the last wins.
    let feed_window = read_optional::<FeedInfoRow>(dir, "feed_info")?
        .into_iter()
        .last()
        .map(|row| FeedWindow {
            start: row.feed_start_date,
            end: row.feed_end_date,
        })
        .unwrap_or_default();

    let trips: Vec<TripRecord> = read_required(dir, "trips")?;

    info!(
        patterns = patterns.len(),
        exceptions = exceptions.len(),
        trips = trips.len(),
        "Snapshot loaded"
    );

    Ok(Snapshot {
        label: generation.label.clone(),
        feed_window,
        patterns,
        exceptions,
        trips,
    })
}
