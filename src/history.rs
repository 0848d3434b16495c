//! Per-date audit log of facts across generations.
//!
//! Each (date, fact key) pair keeps a newest-first history that only grows
//! when the observed value changes.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::model::{FactKey, FactValue, Facts};

/// One observation: the value and the generation that introduced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub value: FactValue,
    pub generation: String,
}

/// Newest-first sequence of distinct observations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditedHistory {
    entries: VecDeque<AuditEntry>,
}

impl AuditedHistory {
    fn starting_with(entry: AuditEntry) -> Self {
        Self {
            entries: VecDeque::from([entry]),
        }
    }

    pub fn latest(&self) -> Option<&AuditEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// Records `value` unless it equals the latest entry. Returns whether the
    /// history grew.
    fn observe(&mut self, value: &FactValue, generation: &str) -> bool {
        if self.latest().is_some_and(|head| &head.value == value) {
            return false;
        }
        self.entries.push_front(AuditEntry {
            value: value.clone(),
            generation: generation.to_string(),
        });
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditedTimeSeries {
    dates: BTreeMap<NaiveDate, BTreeMap<FactKey, AuditedHistory>>,
}

impl AuditedTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one generation's facts for `key`. Returns how many histories
    /// gained an entry.
    pub fn merge(&mut self, facts: &Facts, key: FactKey, generation: &str) -> usize {
        let mut changed = 0;
        for (date, value) in facts {
            let histories = self.dates.entry(*date).or_default();
            match histories.get_mut(&key) {
                Some(history) => {
                    if history.observe(value, generation) {
                        changed += 1;
                    }
                }
                None => {
                    histories.insert(
                        key,
                        AuditedHistory::starting_with(AuditEntry {
                            value: value.clone(),
                            generation: generation.to_string(),
                        }),
                    );
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn history(&self, date: NaiveDate, key: FactKey) -> Option<&AuditedHistory> {
        self.dates.get(&date)?.get(&key)
    }

    pub fn latest(&self, date: NaiveDate, key: FactKey) -> Option<&AuditEntry> {
        self.history(date, key)?.latest()
    }

    /// Every date seen so far, ascending.
    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.keys()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 6).unwrap()
    }

    fn count_facts(n: usize) -> Facts {
        Facts::from([(day(), FactValue::Count(n))])
    }

    #[test]
    fn test_same_value_across_generations_is_compressed() {
        let mut series = AuditedTimeSeries::new();
        for label in ["g1", "g2", "g3"] {
            series.merge(&count_facts(10), FactKey::TripCount, label);
        }

        let history = series.history(day(), FactKey::TripCount).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().generation, "g1");
    }

    #[test]
    fn test_distinct_values_are_newest_first() {
        let mut series = AuditedTimeSeries::new();
        series.merge(&count_facts(10), FactKey::TripCount, "g1");
        series.merge(&count_facts(12), FactKey::TripCount, "g2");
        series.merge(&count_facts(9), FactKey::TripCount, "g3");

        let history = series.history(day(), FactKey::TripCount).unwrap();
        let generations: Vec<&str> = history.iter().map(|e| e.generation.as_str()).collect();
        assert_eq!(generations, vec!["g3", "g2", "g1"]);
        assert_eq!(history.latest().unwrap().value, FactValue::Count(9));
    }

    #[test]
    fn test_returning_to_an_old_value_is_a_change() {
        let mut series = AuditedTimeSeries::new();
        series.merge(&count_facts(10), FactKey::TripCount, "g1");
        series.merge(&count_facts(12), FactKey::TripCount, "g2");
        series.merge(&count_facts(10), FactKey::TripCount, "g3");

        assert_eq!(series.history(day(), FactKey::TripCount).unwrap().len(), 3);
    }

    #[test]
    fn test_remerging_identical_snapshot_is_a_no_op() {
        let mut series = AuditedTimeSeries::new();
        assert_eq!(series.merge(&count_facts(10), FactKey::TripCount, "g1"), 1);
        assert_eq!(series.merge(&count_facts(10), FactKey::TripCount, "g1"), 0);

        assert_eq!(series.history(day(), FactKey::TripCount).unwrap().len(), 1);
    }

    #[test]
    fn test_new_key_on_existing_date_starts_its_own_history() {
        let mut series = AuditedTimeSeries::new();
        series.merge(&count_facts(10), FactKey::TripCount, "g1");
        series.merge(
            &Facts::from([(day(), FactValue::Text("g1".into()))]),
            FactKey::Generation,
            "g1",
        );

        assert_eq!(series.len(), 1);
        assert_eq!(series.history(day(), FactKey::Generation).unwrap().len(), 1);
        assert!(series.history(day(), FactKey::ServiceId).is_none());
    }
}
