//! Batch comparison over a sorted list of generations.

use serde::Serialize;
use tracing::{error, info};

use crate::calendar::{ResolvedGeneration, resolve_snapshot};
use crate::error::GenerationError;
use crate::history::AuditedTimeSeries;
use crate::loader::{Generation, load_snapshot};
use crate::model::{FactKey, Facts};
use crate::pivot::PivotTable;

/// Keys recorded in the audit log for every generation.
pub const AUDITED_KEYS: [FactKey; 5] = [
    FactKey::Generation,
    FactKey::ServiceId,
    FactKey::TripId,
    FactKey::RouteId,
    FactKey::TripCount,
];

/// A generation that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailure {
    pub label: String,
    pub error: String,
}

/// Cross-generation accumulators for one run.
#[derive(Debug, Clone)]
pub struct Comparison {
    pivot_keys: Vec<FactKey>,
    pub series: AuditedTimeSeries,
    pub pivot: PivotTable,
    pub processed: Vec<String>,
    pub failures: Vec<GenerationFailure>,
}

/// Facts of `key` derived from a resolved generation.
///
/// Services come from the resolved calendar so that dates without trips
/// still carry their (possibly empty) service set.
pub fn facts_for(resolved: &ResolvedGeneration, key: FactKey) -> Facts {
    match key {
        FactKey::Generation => resolved.calendar.generation_facts(&resolved.label),
        FactKey::ServiceId => resolved.calendar.service_facts(),
        FactKey::TripId | FactKey::RouteId | FactKey::TripCount => resolved.aggregate.facts(key),
    }
}

impl Comparison {
    /// `pivot_keys` selects, in order, the column groups of the pivot table.
    pub fn new(pivot_keys: &[FactKey]) -> Self {
        let mut keys = Vec::new();
        for key in pivot_keys {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        Self {
            pivot_keys: keys,
            series: AuditedTimeSeries::new(),
            pivot: PivotTable::new(),
            processed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn ingest(&mut self, resolved: &ResolvedGeneration) {
        for key in AUDITED_KEYS {
            let facts = facts_for(resolved, key);
            let changed = self.series.merge(&facts, key, &resolved.label);
            info!(generation = %resolved.label, key = %key, changed, "Facts merged");
        }
        for key in &self.pivot_keys {
            let facts = facts_for(resolved, *key);
            self.pivot.append_column(&facts, *key, &resolved.label);
        }
        self.processed.push(resolved.label.clone());
    }

    pub fn record_failure(&mut self, label: &str, err: &GenerationError) {
        self.failures.push(GenerationFailure {
            label: label.to_string(),
            error: err.to_string(),
        });
    }
}

/// Loads and resolves one generation. The snapshot is released before
/// returning.
pub fn process_generation(generation: &Generation) -> Result<ResolvedGeneration, GenerationError> {
    let snapshot = load_snapshot(generation)?;
    let resolved = resolve_snapshot(&snapshot)?;
    Ok(resolved)
}

/// Processes `generations` in the given order. A failing generation is
/// logged and recorded, and the run moves on to the next one.
pub fn run(generations: &[Generation], pivot_keys: &[FactKey]) -> Comparison {
    let mut comparison = Comparison::new(pivot_keys);

    for generation in generations {
        info!(generation = %generation.label, path = %generation.path.display(), "Loading generation");
        match process_generation(generation) {
            Ok(resolved) => comparison.ingest(&resolved),
            Err(e) => {
                error!(generation = %generation.label, error = %e, "Generation failed, skipping");
                comparison.record_failure(&generation.label, &e);
            }
        }
    }

    info!(
        processed = comparison.processed.len(),
        failed = comparison.failures.len(),
        dates = comparison.series.len(),
        "Comparison finished"
    );
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{
        apply_exceptions, apply_weekly_patterns, expand_dates, join_trips,
        reduce_to_date_aggregate,
    };
    use crate::model::{FactValue, TripRecord, ValidityWindow, WeeklyPattern};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, day).unwrap()
    }

    fn resolved(label: &str, start: u32, end: u32, trips: usize) -> ResolvedGeneration {
        let patterns = vec![WeeklyPattern {
            service_id: "daily".to_string(),
            start_date: d(start),
            end_date: d(end),
            days: [true; 7],
        }];
        let mut calendar = expand_dates(ValidityWindow {
            start: d(start),
            end: d(end),
        })
        .unwrap();
        apply_weekly_patterns(&mut calendar, &patterns);
        let exceptions = apply_exceptions(&mut calendar, &[]);
        let trip_table: Vec<TripRecord> = (0..trips)
            .map(|i| TripRecord {
                route_id: "R".to_string(),
                service_id: "daily".to_string(),
                trip_id: format!("T{i}"),
            })
            .collect();
        let aggregate = reduce_to_date_aggregate(&join_trips(&calendar, &trip_table));
        ResolvedGeneration {
            label: label.to_string(),
            calendar,
            exceptions,
            aggregate,
        }
    }

    #[test]
    fn test_ingest_tracks_owner_and_trip_changes() {
        let mut comparison = Comparison::new(&[FactKey::Generation, FactKey::TripCount]);
        comparison.ingest(&resolved("g1", 1, 10, 3));
        comparison.ingest(&resolved("g2", 5, 15, 3));
        comparison.ingest(&resolved("g3", 8, 20, 4));

        let owners = comparison.series.history(d(9), FactKey::Generation).unwrap();
        assert_eq!(owners.len(), 3);
        assert_eq!(owners.latest().unwrap().value, FactValue::Text("g3".into()));

        let trips = comparison.series.history(d(6), FactKey::TripCount).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips.latest().unwrap().generation, "g1");

        let trips = comparison.series.history(d(9), FactKey::TripCount).unwrap();
        assert_eq!(trips.len(), 2);

        assert_eq!(comparison.processed, vec!["g1", "g2", "g3"]);
    }

    #[test]
    fn test_pivot_only_holds_selected_keys() {
        let mut comparison = Comparison::new(&[FactKey::TripCount, FactKey::TripCount]);
        comparison.ingest(&resolved("g1", 1, 2, 1));
        comparison.ingest(&resolved("g2", 2, 3, 2));

        assert_eq!(comparison.pivot.keys(), &[FactKey::TripCount]);
        let rows = comparison.pivot.export();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cells, vec!["1", ""]);
        assert_eq!(rows[1].cells, vec!["1", "2"]);
        assert_eq!(rows[2].cells, vec!["", "2"]);
    }

    #[test]
    fn test_service_facts_cover_days_without_trips() {
        let generation = resolved("g1", 1, 3, 0);

        assert_eq!(facts_for(&generation, FactKey::ServiceId).len(), 3);
        assert!(facts_for(&generation, FactKey::TripCount).is_empty());
    }
}
