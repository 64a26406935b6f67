//! In-memory record table shared by every pipeline stage.
//!
//! Rows are positional: `rows[r][c]` holds the cell for `headers[c]`. Stages
//! consume a table and hand back a new one; filtering produces a fresh table
//! and never touches its input.

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::data::Value;

pub type Cell = Option<Value>;
pub type Row = Vec<Cell>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordTable {
    #[serde(rename = "columns")]
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl RecordTable {
    /// Builds a table, padding or truncating rows to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.headers, self.rows)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.has_column(name))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column)).and_then(|c| c.as_ref())
    }

    /// Iterates over one column's cells, or `None` when the column is absent.
    pub fn column<'a>(
        &'a self,
        name: &str,
    ) -> Option<impl Iterator<Item = Option<&'a Value>> + use<'a>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_ref()))
    }

    /// Numeric view of a column: non-numeric and missing cells map to `None`.
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|cells| cells.map(|cell| cell.and_then(Value::as_f64)).collect())
    }

    /// A column is numeric-typed when it exists and every present cell is numeric.
    pub fn is_numeric_column(&self, name: &str) -> bool {
        match self.column(name) {
            Some(mut cells) => cells.all(|cell| cell.is_none_or(Value::is_numeric)),
            None => false,
        }
    }

    pub fn rename_headers(&mut self, headers: Vec<String>) {
        debug_assert_eq!(headers.len(), self.headers.len());
        self.headers = headers;
    }

    /// Replaces the named column, or appends it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Rewrites every cell of an existing column in place.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(Cell) -> Cell,
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            let taken = row[idx].take();
            row[idx] = f(taken);
        }
        true
    }

    /// Returns a new table holding the rows accepted by `keep`.
    pub fn filter_rows<F>(&self, mut keep: F) -> RecordTable
    where
        F: FnMut(&[Cell]) -> bool,
    {
        RecordTable {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row.as_slice()))
                .cloned()
                .collect(),
        }
    }

    pub fn head(&self, limit: usize) -> RecordTable {
        RecordTable {
            headers: self.headers.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }

    pub fn project(&self, columns: &[&str]) -> Result<RecordTable> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| anyhow!("Column '{name}' not found"))
            })
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        Ok(RecordTable {
            headers: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Distinct present values of a column in first-seen order.
    pub fn distinct_values(&self, name: &str) -> Vec<Value> {
        let Some(cells) = self.column(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        cells
            .flatten()
            .filter(|value| seen.insert(value.as_display()))
            .cloned()
            .collect()
    }

    pub fn sort_rows_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Row, &Row) -> std::cmp::Ordering,
    {
        self.rows.sort_by(compare);
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// String rendering of every row; missing cells become empty strings.
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordTable {
        RecordTable::new(
            vec!["Segment".into(), "Sales".into()],
            vec![
                vec![Some(Value::text("A")), Some(Value::Number(10.0))],
                vec![Some(Value::text("B")), None],
                vec![Some(Value::text("A")), Some(Value::Number(5.0))],
            ],
        )
    }

    #[test]
    fn new_pads_short_rows() {
        let table = RecordTable::new(vec!["a".into(), "b".into()], vec![vec![None]]);
        assert_eq!(table.rows()[0].len(), 2);
    }

    #[test]
    fn numeric_column_detection_ignores_missing() {
        let table = sample();
        assert!(table.is_numeric_column("Sales"));
        assert!(!table.is_numeric_column("Segment"));
        assert!(!table.is_numeric_column("Profit"));
    }

    #[test]
    fn set_column_appends_then_replaces() {
        let mut table = sample();
        table.set_column("Flag", vec![None, None, Some(Value::Integer(1))]);
        assert_eq!(table.headers().len(), 3);
        table.set_column("Flag", vec![Some(Value::Integer(0)); 3]);
        assert_eq!(table.headers().len(), 3);
        assert_eq!(table.cell(2, 2), Some(&Value::Integer(0)));
    }

    #[test]
    fn filter_rows_leaves_source_untouched() {
        let table = sample();
        let filtered = table.filter_rows(|row| row[1].is_some());
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn distinct_values_keep_first_seen_order() {
        let table = sample();
        assert_eq!(
            table.distinct_values("Segment"),
            vec![Value::text("A"), Value::text("B")]
        );
        assert!(table.distinct_values("Country").is_empty());
    }

    #[test]
    fn project_rejects_unknown_columns() {
        let table = sample();
        assert!(table.project(&["Sales"]).is_ok());
        assert!(table.project(&["Profit"]).is_err());
    }
}
