//! Filter options: the distinct values a selection can offer per column,
//! with row counts, plus the span of parsed dates.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;

use crate::{
    cli::{OptionsArgs, OutputFormat},
    filter::FILTER_COLUMNS,
    record::RecordTable,
    table, temporal,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOptions {
    pub column: String,
    pub values: Vec<ValueCount>,
    /// Rows with no value in this column; they never match a selection.
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub columns: Vec<ColumnOptions>,
    pub date_range: Option<DateSpan>,
}

struct FrequencyAccumulator {
    order: Vec<String>,
    counts: HashMap<String, usize>,
    total: usize,
    missing: usize,
}

impl FrequencyAccumulator {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            counts: HashMap::new(),
            total: 0,
            missing: 0,
        }
    }

    fn ingest(&mut self, value: Option<String>) {
        let Some(value) = value else {
            self.missing += 1;
            return;
        };
        self.total += 1;
        let counter = self.counts.entry(value.clone()).or_insert_with(|| {
            self.order.push(value);
            0
        });
        *counter += 1;
    }

    fn finish(mut self, column: &str) -> ColumnOptions {
        let total = self.total;
        let values = self
            .order
            .into_iter()
            .map(|value| {
                let count = self.counts.remove(&value).unwrap_or_default();
                let percent = if total == 0 {
                    0.0
                } else {
                    (count as f64 / total as f64) * 100.0
                };
                ValueCount {
                    value,
                    count,
                    percent,
                }
            })
            .collect();
        ColumnOptions {
            column: column.to_string(),
            values,
            missing: self.missing,
        }
    }
}

/// Distinct values in first-seen order for each requested column present.
pub fn filter_options(table: &RecordTable, columns: &[&str]) -> FilterOptions {
    let columns = columns
        .iter()
        .filter_map(|&name| {
            let Some(cells) = table.column(name) else {
                debug!("Column '{name}' absent; no options listed");
                return None;
            };
            let mut accumulator = FrequencyAccumulator::new();
            for cell in cells {
                accumulator.ingest(cell.map(|v| v.as_display()));
            }
            Some(accumulator.finish(name))
        })
        .collect();
    let date_range = temporal::date_bounds(table).map(|(start, end)| DateSpan { start, end });
    FilterOptions {
        columns,
        date_range,
    }
}

pub fn render_options(options: &FilterOptions) -> String {
    let headers = vec![
        "column".to_string(),
        "value".to_string(),
        "count".to_string(),
        "percent".to_string(),
    ];
    let rows = options
        .columns
        .iter()
        .flat_map(|column| {
            column.values.iter().map(|entry| {
                vec![
                    column.column.clone(),
                    entry.value.clone(),
                    entry.count.to_string(),
                    format!("{:.2}%", entry.percent),
                ]
            })
        })
        .collect::<Vec<_>>();
    let mut out = table::render_table(&headers, &rows);
    if let Some(span) = &options.date_range {
        out.push_str(&format!("\nDate range: {} to {}\n", span.start, span.end));
    }
    out
}

pub fn execute(args: &OptionsArgs) -> Result<()> {
    let prepared = crate::load_prepared(&args.source)?;
    let selection = crate::resolve_selection(&args.filters)?;
    let view = crate::pipeline::view(&prepared, &selection.dates_only());

    let requested = args
        .columns
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>();
    let columns = if requested.is_empty() {
        FILTER_COLUMNS.to_vec()
    } else {
        requested
    };
    let options = filter_options(&view, &columns);
    match args.format {
        OutputFormat::Table => print!("{}", render_options(&options)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&options)?),
    }
    info!(
        "Listed options for {} column(s) over {} row(s)",
        options.columns.len(),
        view.row_count()
    );
    Ok(())
}
