//! Wide, generation-aligned comparison table.
//!
//! Every fact key owns a column group that gains one column per generation
//! appended. Rows are padded so that, after `n` appends for a key, each row's
//! group for that key holds exactly `n` cells.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::model::{FactKey, Facts};

/// One exported row: the date and every column group, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRow {
    pub date: NaiveDate,
    pub cells: Vec<String>,
}

impl PivotRow {
    /// The row as CSV fields, ISO date first.
    pub fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(self.cells.len() + 1);
        record.push(self.date.format("%Y-%m-%d").to_string());
        record.extend(self.cells.iter().cloned());
        record
    }
}

#[derive(Debug, Clone, Default)]
pub struct PivotTable {
    /// Keys in the order they were first appended.
    keys: Vec<FactKey>,
    /// Generation labels per key; the length is the key's current width.
    headers: BTreeMap<FactKey, Vec<String>>,
    rows: BTreeMap<NaiveDate, BTreeMap<FactKey, Vec<String>>>,
}

impl PivotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one generation's column to the group of `key`.
    pub fn append_column(&mut self, facts: &Facts, key: FactKey, generation: &str) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }

        let headers = self.headers.entry(key).or_default();
        let width = headers.len();
        headers.push(generation.to_string());

        for (date, value) in facts {
            let cells = self.rows.entry(*date).or_default().entry(key).or_default();
            cells.resize(width, String::new());
            cells.push(value.to_string());
        }

        for (date, columns) in self.rows.iter_mut() {
            if facts.contains_key(date) {
                continue;
            }
            if let Some(cells) = columns.get_mut(&key) {
                cells.resize(width + 1, String::new());
            }
        }
    }

    /// Number of generations appended for `key`.
    pub fn width(&self, key: FactKey) -> usize {
        self.headers.get(&key).map_or(0, Vec::len)
    }

    pub fn headers(&self, key: FactKey) -> &[String] {
        self.headers.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> &[FactKey] {
        &self.keys
    }

    /// The stored cells of one date for one key, if the date was ever seen
    /// for that key.
    pub fn cells(&self, date: NaiveDate, key: FactKey) -> Option<&[String]> {
        self.rows.get(&date)?.get(&key).map(Vec::as_slice)
    }

    /// Labels matching [`PivotRow::to_record`]: `date`, then `key@generation`.
    pub fn header_row(&self) -> Vec<String> {
        let mut header = vec!["date".to_string()];
        for key in &self.keys {
            header.extend(self.headers(*key).iter().map(|label| format!("{key}@{label}")));
        }
        header
    }

    /// Rows in ascending date order. A date never observed for a key gets a
    /// full group of empty cells for it.
    pub fn export(&self) -> Vec<PivotRow> {
        self.rows
            .iter()
            .map(|(date, columns)| {
                let mut cells = Vec::new();
                for key in &self.keys {
                    let width = self.width(*key);
                    let mut group = columns.get(key).cloned().unwrap_or_default();
                    group.resize(width, String::new());
                    cells.extend(group);
                }
                PivotRow { date: *date, cells }
            })
            .collect()
    }
}
