//! Schedule types shared by the resolver, the audit log and the pivot table.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A recurring service from `calendar.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyPattern {
    pub service_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Monday first.
    pub days: [bool; 7],
}

impl WeeklyPattern {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// True when the pattern spans `date` and its weekday flag is set.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.covers(date) && self.days[date.weekday().num_days_from_monday() as usize]
    }
}

/// Whether a `calendar_dates.txt` row adds or removes a service.
///
/// Variant order matters: sorting exceptions puts every `Add` of a date
/// ahead of its `Remove`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExceptionKind {
    #[serde(rename = "1")]
    Add,
    #[serde(rename = "2")]
    Remove,
}

/// A single-date override of a weekly pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarException {
    pub service_id: String,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

/// Validity declared in `feed_info.txt`. Either bound may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Inclusive date range a generation is resolved over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidityWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ValidityWindow {
    pub fn len_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1).max(0) as usize
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub type ServiceSet = BTreeSet<String>;

/// Active services for every date of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCalendar {
    pub window: ValidityWindow,
    pub(crate) days: BTreeMap<NaiveDate, ServiceSet>,
}

impl ResolvedCalendar {
    pub fn services_on(&self, date: NaiveDate) -> Option<&ServiceSet> {
        self.days.get(&date)
    }

    /// Dates in ascending order with their services.
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &ServiceSet)> {
        self.days.iter()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// One `Set` fact per date, for the audit log and pivot table.
    pub fn service_facts(&self) -> Facts {
        self.days
            .iter()
            .map(|(date, services)| (*date, FactValue::Set(services.clone())))
            .collect()
    }

    /// The owning-generation fact: every date of the window maps to `label`.
    pub fn generation_facts(&self, label: &str) -> Facts {
        self.days
            .keys()
            .map(|date| (*date, FactValue::Text(label.to_string())))
            .collect()
    }
}

/// A `trips.txt` row. Only the identifier columns are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TripRecord {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
}

/// A trip running on a concrete date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripFact {
    pub date: NaiveDate,
    pub service_id: String,
    pub trip_id: String,
    pub route_id: String,
}

/// Distinct values seen on one date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayFacts {
    pub service_ids: BTreeSet<String>,
    pub trip_ids: BTreeSet<String>,
    pub route_ids: BTreeSet<String>,
    pub trips: usize,
}

/// Trip facts reduced per date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateAggregate {
    pub days: BTreeMap<NaiveDate, DayFacts>,
}

impl DateAggregate {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DayFacts> {
        self.days.get(&date)
    }

    /// Projects one column of the aggregate. `Generation` is not a trip
    /// column and yields nothing.
    pub fn facts(&self, key: FactKey) -> Facts {
        self.days
            .iter()
            .filter_map(|(date, day)| {
                let value = match key {
                    FactKey::ServiceId => FactValue::Set(day.service_ids.clone()),
                    FactKey::TripId => FactValue::Set(day.trip_ids.clone()),
                    FactKey::RouteId => FactValue::Set(day.route_ids.clone()),
                    FactKey::TripCount => FactValue::Count(day.trips),
                    FactKey::Generation => return None,
                };
                Some((*date, value))
            })
            .collect()
    }
}

/// Names a family of per-date facts (one pivot column group each).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum FactKey {
    Generation,
    ServiceId,
    TripId,
    RouteId,
    TripCount,
}

impl FactKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKey::Generation => "generation",
            FactKey::ServiceId => "service_id",
            FactKey::TripId => "trip_id",
            FactKey::RouteId => "route_id",
            FactKey::TripCount => "trip_count",
        }
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An observed value for one date and fact key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    Text(String),
    Set(BTreeSet<String>),
    Count(usize),
}

impl FactValue {
    /// Number of elements for sets, the count itself for counts, 1 for text.
    pub fn size(&self) -> usize {
        match self {
            FactValue::Text(_) => 1,
            FactValue::Set(set) => set.len(),
            FactValue::Count(n) => *n,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Text(text) => f.write_str(text),
            FactValue::Set(set) => {
                let joined: Vec<&str> = set.iter().map(String::as_str).collect();
                f.write_str(&joined.join(" "))
            }
            FactValue::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Per-date values of a single fact key, as handed to the accumulators.
pub type Facts = BTreeMap<NaiveDate, FactValue>;
