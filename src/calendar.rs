//! Calendar resolution for a single generation.
//!
//! Weekly patterns are expanded over the generation's validity window, then
//! single-date exceptions are applied on top. The result is joined against
//! the trip table and reduced to per-date fact sets.

use chrono::Days;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::CalendarError;
use crate::loader::Snapshot;
use crate::model::{
    CalendarException, DateAggregate, ExceptionKind, FeedWindow, ResolvedCalendar, TripFact,
    TripRecord, ValidityWindow, WeeklyPattern,
};

/// Outcome of applying `calendar_dates.txt` to a resolved calendar.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExceptionReport {
    pub applied: usize,
    /// Exceptions whose date lies outside the validity window.
    pub out_of_range: Vec<CalendarException>,
    /// Removals of a service that was not running that day.
    pub missing_on_removal: usize,
}

/// Everything derived from one generation.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedGeneration {
    pub label: String,
    #[serde(skip)]
    pub calendar: ResolvedCalendar,
    pub exceptions: ExceptionReport,
    #[serde(skip)]
    pub aggregate: DateAggregate,
}

/// Intersects the declared feed validity with the span of the weekly
/// patterns: the later of the starts, the earlier of the ends.
///
/// # Errors
///
/// [`CalendarError::NoWeeklyPatterns`] when there is nothing to span, and
/// [`CalendarError::EmptyWindow`] when the intersection is inverted.
pub fn resolve_validity_window(
    declared: &FeedWindow,
    patterns: &[WeeklyPattern],
) -> Result<ValidityWindow, CalendarError> {
    let span_start = patterns
        .iter()
        .map(|p| p.start_date)
        .min()
        .ok_or(CalendarError::NoWeeklyPatterns)?;
    let span_end = patterns
        .iter()
        .map(|p| p.end_date)
        .max()
        .ok_or(CalendarError::NoWeeklyPatterns)?;

    let start = declared.start.map_or(span_start, |s| s.max(span_start));
    let end = declared.end.map_or(span_end, |e| e.min(span_end));

    if start > end {
        return Err(CalendarError::EmptyWindow { start, end });
    }
    Ok(ValidityWindow { start, end })
}

/// Builds a calendar with an empty service set for every date of `window`.
///
/// # Errors
///
/// [`CalendarError::EmptyWindow`] when `window` is inverted.
pub fn expand_dates(window: ValidityWindow) -> Result<ResolvedCalendar, CalendarError> {
    if window.start > window.end {
        return Err(CalendarError::EmptyWindow {
            start: window.start,
            end: window.end,
        });
    }

    let mut days = std::collections::BTreeMap::new();
    let mut current = window.start;
    loop {
        days.insert(current, Default::default());
        if current >= window.end {
            break;
        }
        current = current
            .checked_add_days(Days::new(1))
            .ok_or(CalendarError::DateOverflow(current))?;
    }
    Ok(ResolvedCalendar { window, days })
}

/// Adds each pattern's service to every date it runs on.
pub fn apply_weekly_patterns(calendar: &mut ResolvedCalendar, patterns: &[WeeklyPattern]) {
    for (date, services) in calendar.days.iter_mut() {
        for pattern in patterns {
            if pattern.runs_on(*date) {
                services.insert(pattern.service_id.clone());
            }
        }
    }
}

/// Applies exceptions in `(date, kind)` order so that, within a date, all
/// additions land before any removal.
///
/// Exceptions outside the calendar's window are skipped and reported.
/// Removing a service that is not running is a no-op.
pub fn apply_exceptions(
    calendar: &mut ResolvedCalendar,
    exceptions: &[CalendarException],
) -> ExceptionReport {
    let mut ordered: Vec<&CalendarException> = exceptions.iter().collect();
    ordered.sort_by_key(|e| (e.date, e.kind));

    let mut report = ExceptionReport::default();
    for exception in ordered {
        let Some(services) = calendar.days.get_mut(&exception.date) else {
            warn!(
                service_id = %exception.service_id,
                date = %exception.date,
                kind = ?exception.kind,
                "calendar_dates entry is outside the validity window, skipping"
            );
            report.out_of_range.push(exception.clone());
            continue;
        };

        match exception.kind {
            ExceptionKind::Add => {
                services.insert(exception.service_id.clone());
            }
            ExceptionKind::Remove => {
                if !services.remove(&exception.service_id) {
                    debug!(
                        service_id = %exception.service_id,
                        date = %exception.date,
                        "removal of a service that is not running"
                    );
                    report.missing_on_removal += 1;
                }
            }
        }
        report.applied += 1;
    }
    report
}

/// Joins the calendar with the trip table on `service_id`.
///
/// Output is ordered by date, then service, then trip table order. Identifier
/// values are trimmed.
pub fn join_trips(calendar: &ResolvedCalendar, trips: &[TripRecord]) -> Vec<TripFact> {
    let mut by_service: HashMap<&str, Vec<&TripRecord>> = HashMap::new();
    for trip in trips {
        by_service.entry(trip.service_id.trim()).or_default().push(trip);
    }

    let mut facts = Vec::new();
    for (date, services) in calendar.iter() {
        for service_id in services {
            let service_id = service_id.trim();
            let Some(matching) = by_service.get(service_id) else {
                continue;
            };
            for trip in matching {
                facts.push(TripFact {
                    date: *date,
                    service_id: service_id.to_string(),
                    trip_id: trip.trip_id.trim().to_string(),
                    route_id: trip.route_id.trim().to_string(),
                });
            }
        }
    }
    facts
}

/// Groups trip facts by date, collecting the distinct values of every other
/// column. Empty input gives an empty aggregate.
pub fn reduce_to_date_aggregate(facts: &[TripFact]) -> DateAggregate {
    let mut aggregate = DateAggregate::default();
    for fact in facts {
        let day = aggregate.days.entry(fact.date).or_default();
        day.service_ids.insert(fact.service_id.clone());
        day.trip_ids.insert(fact.trip_id.clone());
        day.route_ids.insert(fact.route_id.clone());
        day.trips += 1;
    }
    aggregate
}

/// Runs window, dates, patterns, exceptions, join and aggregation in order.
#[tracing::instrument(skip(snapshot), fields(generation = %snapshot.label))]
pub fn resolve_snapshot(snapshot: &Snapshot) -> Result<ResolvedGeneration, CalendarError> {
    let window = resolve_validity_window(&snapshot.feed_window, &snapshot.patterns)?;
    let mut calendar = expand_dates(window)?;
    apply_weekly_patterns(&mut calendar, &snapshot.patterns);
    let exceptions = apply_exceptions(&mut calendar, &snapshot.exceptions);

    let facts = join_trips(&calendar, &snapshot.trips);
    let aggregate = reduce_to_date_aggregate(&facts);

    info!(
        start = %window.start,
        end = %window.end,
        days = calendar.len(),
        trip_facts = facts.len(),
        skipped_exceptions = exceptions.out_of_range.len(),
        "Generation resolved"
    );

    Ok(ResolvedGeneration {
        label: snapshot.label.clone(),
        calendar,
        exceptions,
        aggregate,
    })
}
