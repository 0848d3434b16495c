use chrono::NaiveDate;
use gtfs_calendar_diff::loader::list_generations;
use gtfs_calendar_diff::model::{FactKey, FactValue};
use gtfs_calendar_diff::output::summarize;
use gtfs_calendar_diff::pipeline::{process_generation, run};
use std::path::PathBuf;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/generations")
}

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, m, day).unwrap()
}

#[test]
fn test_resolve_first_generation() {
    let generations = list_generations(&fixtures()).expect("Failed to list fixtures");
    let resolved = process_generation(&generations[0]).expect("Failed to resolve generation");

    // feed_info narrows the calendar span to January
    assert_eq!(resolved.calendar.window.start, d(1, 1));
    assert_eq!(resolved.calendar.window.end, d(1, 31));
    assert_eq!(resolved.calendar.len(), 31);

    let new_year = resolved.calendar.services_on(d(1, 1)).unwrap();
    assert!(new_year.contains("holiday"));
    assert!(!new_year.contains("weekday"));
    assert_eq!(resolved.exceptions.out_of_range.len(), 1);

    let day = resolved.aggregate.get(d(1, 1)).unwrap();
    assert!(day.trip_ids.contains("T4"));
    assert_eq!(resolved.aggregate.get(d(1, 2)).unwrap().trips, 2);
}

#[test]
fn test_full_pipeline() {
    let generations = list_generations(&fixtures()).expect("Failed to list fixtures");
    assert_eq!(generations.len(), 3);

    let comparison = run(&generations, &[FactKey::Generation, FactKey::TripCount]);

    assert_eq!(comparison.processed, vec!["20200101", "20200201"]);
    assert_eq!(comparison.failures.len(), 1);
    assert_eq!(comparison.failures[0].label, "20200301_broken");

    // January 1 through February 29
    assert_eq!(comparison.series.len(), 60);

    let owners = comparison
        .series
        .history(d(1, 15), FactKey::Generation)
        .unwrap();
    assert_eq!(owners.len(), 2);
    assert_eq!(
        owners.latest().unwrap().value,
        FactValue::Text("20200201".into())
    );

    let weekend = comparison
        .series
        .history(d(1, 18), FactKey::TripCount)
        .unwrap();
    assert_eq!(weekend.len(), 1);

    let summaries = summarize(&comparison.series);
    let jan15 = summaries.iter().find(|s| s.date == d(1, 15)).unwrap();
    assert_eq!(jan15.trip_history, "3 (20200201) <- 2 (20200101)");
    assert_eq!(jan15.generations, 2);

    let rows = comparison.pivot.export();
    assert_eq!(rows.len(), 60);
    assert!(rows.iter().all(|r| r.cells.len() == 4));

    let row = |date: NaiveDate| rows.iter().find(|r| r.date == date).unwrap().to_record();
    assert_eq!(row(d(1, 2)), vec!["2020-01-02", "20200101", "", "2", ""]);
    assert_eq!(
        row(d(1, 15)),
        vec!["2020-01-15", "20200101", "20200201", "2", "3"]
    );
    assert_eq!(row(d(2, 10)), vec!["2020-02-10", "", "20200201", "", "3"]);
}
