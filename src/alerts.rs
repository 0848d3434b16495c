//! Service alert snapshots and change detection across them.
//!
//! Snapshots are protobuf `FeedMessage` files named after the minute they
//! were captured (`2020-03-01T00:00:05.pb`). A scan walks a time range at a
//! fixed step and reports every step whose alert content differs from the
//! previous snapshot read.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::AlertError;
use crate::gtfs_rt::{self, FeedMessage};
use crate::parser::parse_feed;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InformedEntity {
    pub agency_id: Option<String>,
    pub route_id: Option<String>,
    pub route_type: Option<i32>,
    pub trip_id: Option<String>,
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub periods: Vec<Period>,
    pub informed_entities: Vec<InformedEntity>,
    pub cause: String,
    pub effect: String,
    pub url: String,
    pub header_text: String,
    pub description_text: String,
}

/// The alerts of one feed message.
#[derive(Debug, Clone, Serialize)]
pub struct AlertSnapshot {
    pub version: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub alerts: Vec<AlertSummary>,
}

/// A scan step whose snapshot differed from the one before it.
#[derive(Debug, Clone, Serialize)]
pub struct AlertChange {
    pub at: NaiveDateTime,
    pub file: PathBuf,
    pub alert_count: usize,
}

fn from_unix(secs: Option<u64>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(secs?).ok()?, 0)
}

fn first_translation(text: Option<&gtfs_rt::TranslatedString>) -> String {
    text.and_then(|t| t.translation.first())
        .map(|t| t.text.clone())
        .unwrap_or_default()
}

impl From<&gtfs_rt::Alert> for AlertSummary {
    fn from(alert: &gtfs_rt::Alert) -> Self {
        AlertSummary {
            periods: alert
                .active_period
                .iter()
                .map(|p| Period {
                    start: from_unix(p.start),
                    end: from_unix(p.end),
                })
                .collect(),
            informed_entities: alert
                .informed_entity
                .iter()
                .map(|e| InformedEntity {
                    agency_id: e.agency_id.clone(),
                    route_id: e.route_id.clone(),
                    route_type: e.route_type,
                    trip_id: e.trip.as_ref().and_then(|t| t.trip_id.clone()),
                    stop_id: e.stop_id.clone(),
                })
                .collect(),
            cause: alert.cause().as_str_name().to_string(),
            effect: alert.effect().as_str_name().to_string(),
            url: first_translation(alert.url.as_ref()),
            header_text: first_translation(alert.header_text.as_ref()),
            description_text: first_translation(alert.description_text.as_ref()),
        }
    }
}

impl AlertSnapshot {
    pub fn from_feed(feed: &FeedMessage) -> Self {
        AlertSnapshot {
            version: feed.header.gtfs_realtime_version.clone(),
            timestamp: from_unix(feed.header.timestamp),
            alerts: feed
                .entity
                .iter()
                .filter_map(|e| e.alert.as_ref())
                .map(AlertSummary::from)
                .collect(),
        }
    }

    /// Compares version and alerts, in order. The header timestamp is ignored.
    pub fn same_content(&self, other: &AlertSnapshot) -> bool {
        self.version == other.version && self.alerts == other.alerts
    }
}

pub fn read_snapshot(path: &Path) -> Result<AlertSnapshot, AlertError> {
    let bytes = fs::read(path).map_err(|source| AlertError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let feed = parse_feed(&bytes)?;
    Ok(AlertSnapshot::from_feed(&feed))
}

/// Walks `[from, to]` by `step`, reading the first snapshot file captured in
/// each step's minute, and returns the steps where alert content changed.
/// The first snapshot found always counts as a change.
#[tracing::instrument(skip(dir), fields(dir = %dir.display()))]
pub fn scan_alert_files(
    dir: &Path,
    from: NaiveDateTime,
    to: NaiveDateTime,
    step: TimeDelta,
) -> Result<Vec<AlertChange>, AlertError> {
    if step <= TimeDelta::zero() {
        return Err(AlertError::InvalidStep(step));
    }

    let io_err = |source: std::io::Error| AlertError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".pb") {
                files.push((name.to_string(), entry.path()));
            }
        }
    }
    files.sort();

    let mut changes = Vec::new();
    let mut previous: Option<AlertSnapshot> = None;
    let mut current = from;
    while current <= to {
        let prefix = current.format("%Y-%m-%dT%H:%M:").to_string();
        if let Some((_, path)) = files.iter().find(|(name, _)| name.starts_with(&prefix)) {
            let snapshot = read_snapshot(path)?;
            let changed = previous
                .as_ref()
                .is_none_or(|prev| !prev.same_content(&snapshot));
            if changed {
                info!(at = %current, alerts = snapshot.alerts.len(), "Alert content changed");
                changes.push(AlertChange {
                    at: current,
                    file: path.clone(),
                    alert_count: snapshot.alerts.len(),
                });
            } else {
                debug!(at = %current, "Alert content unchanged");
            }
            previous = Some(snapshot);
        }

        current = match current.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(changes)
}
