//! Output formatting and persistence for comparison results.
//!
//! Writes the pivot table, the per-date summary and single resolved
//! calendars as CSV.

use anyhow::Result;
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::calendar::ResolvedGeneration;
use crate::history::AuditedTimeSeries;
use crate::model::{FactKey, ResolvedCalendar};
use crate::pivot::PivotTable;

/// Final per-date view of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateSummary {
    pub date: NaiveDate,
    pub latest_generation: String,
    /// Number of generations that took ownership of the date.
    pub generations: usize,
    /// Sizes of the distinct trip_id set, newest first: `"12 (g3) <- 10 (g1)"`.
    /// A generation appears whenever the set changed, even at equal size.
    pub trip_history: String,
}

/// Builds one [`DateSummary`] per audited date.
pub fn summarize(series: &AuditedTimeSeries) -> Vec<DateSummary> {
    series
        .dates()
        .map(|date| {
            let owners = series.history(*date, FactKey::Generation);
            let latest_generation = owners
                .and_then(|h| h.latest())
                .map(|entry| entry.value.to_string())
                .unwrap_or_default();
            let trip_history = series
                .history(*date, FactKey::TripId)
                .map(|h| {
                    h.iter()
                        .map(|entry| format!("{} ({})", entry.value.size(), entry.generation))
                        .collect::<Vec<_>>()
                        .join(" <- ")
                })
                .unwrap_or_default();
            DateSummary {
                date: *date,
                latest_generation,
                generations: owners.map_or(0, |h| h.len()),
                trip_history,
            }
        })
        .collect()
}

/// Logs a generation's resolution report as pretty-printed JSON.
pub fn print_json(resolved: &ResolvedGeneration) -> Result<()> {
    debug!("{}", serde_json::to_string_pretty(resolved)?);
    Ok(())
}

/// Writes the pivot table export. Fact-key columns carry no header unless
/// `with_header` is set.
pub fn write_pivot(path: &Path, table: &PivotTable, with_header: bool) -> Result<()> {
    let mut writer = WriterBuilder::new().flexible(false).from_path(path)?;

    if with_header {
        writer.write_record(table.header_row())?;
    }
    let rows = table.export();
    for row in &rows {
        writer.write_record(row.to_record())?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Pivot table written");
    Ok(())
}

pub fn write_summary(path: &Path, summaries: &[DateSummary]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = summaries.len(), "Summary written");
    Ok(())
}

/// Writes `date,service_ids` rows for a resolved calendar.
pub fn write_calendar(path: &Path, calendar: &ResolvedCalendar) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["date", "service_ids"])?;
    for (date, services) in calendar.iter() {
        let joined = services.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        writer.write_record([date.format("%Y-%m-%d").to_string(), joined])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FactValue, Facts};
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(name)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    fn trip_set(ids: &[&str]) -> FactValue {
        FactValue::Set(ids.iter().map(|id| id.to_string()).collect())
    }

    fn merge_day(series: &mut AuditedTimeSeries, label: &str, trips: FactValue) {
        series.merge(
            &Facts::from([(d(6), FactValue::Text(label.into()))]),
            FactKey::Generation,
            label,
        );
        series.merge(&Facts::from([(d(6), trips)]), FactKey::TripId, label);
    }

    #[test]
    fn test_summarize_renders_trip_history() {
        let mut series = AuditedTimeSeries::new();
        merge_day(&mut series, "g1", trip_set(&["T1", "T2"]));
        merge_day(&mut series, "g2", trip_set(&["T1", "T2"]));
        merge_day(&mut series, "g3", trip_set(&["T1", "T2", "T3"]));

        let summaries = summarize(&series);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].latest_generation, "g3");
        assert_eq!(summaries[0].generations, 3);
        assert_eq!(summaries[0].trip_history, "3 (g3) <- 2 (g1)");
    }

    #[test]
    fn test_summarize_lists_trip_set_changes_at_equal_size() {
        let mut series = AuditedTimeSeries::new();
        merge_day(&mut series, "g1", trip_set(&["T1", "T2"]));
        merge_day(&mut series, "g2", trip_set(&["T1", "T5"]));
        merge_day(&mut series, "g3", trip_set(&["T1", "T1"]));

        let summaries = summarize(&series);

        assert_eq!(summaries[0].trip_history, "1 (g3) <- 2 (g2) <- 2 (g1)");
    }

    #[test]
    fn test_write_pivot_without_header() {
        let path = temp_path("gtfs_calendar_diff_test_pivot.csv");
        let _ = fs::remove_file(&path);

        let mut table = PivotTable::new();
        table.append_column(
            &Facts::from([(d(1), FactValue::Count(3))]),
            FactKey::TripCount,
            "g1",
        );
        table.append_column(
            &Facts::from([(d(2), FactValue::Count(4))]),
            FactKey::TripCount,
            "g2",
        );
        write_pivot(&path, &table, false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec!["2020-01-01,3,", "2020-01-02,,4"]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_summary_has_one_header() {
        let path = temp_path("gtfs_calendar_diff_test_summary.csv");
        let _ = fs::remove_file(&path);

        let summary = DateSummary {
            date: d(1),
            latest_generation: "g1".to_string(),
            generations: 1,
            trip_history: "3 (g1)".to_string(),
        };
        write_summary(&path, &[summary.clone(), summary]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("latest_generation")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }
}
