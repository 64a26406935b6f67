//! Group-by reductions over a (usually filtered) record table.
//!
//! Output rows appear in first-seen order of their grouping key unless a sort
//! is requested. Missing measure values are skipped by every reducer; rows
//! with a missing grouping value are left out of every group.

use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::{Context, Result, anyhow, bail, ensure};
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::{
    cli::{AggregateArgs, OutputFormat},
    data::{Value, compare_cells},
    io_utils,
    record::{Cell, RecordTable},
    table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Mean,
    Count,
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Count => "count",
        };
        f.write_str(label)
    }
}

impl FromStr for Reducer {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" | "total" => Ok(Reducer::Sum),
            "mean" | "avg" | "average" => Ok(Reducer::Mean),
            "count" => Ok(Reducer::Count),
            other => bail!("Unknown reducer '{other}' (expected sum, mean or count)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measure {
    pub column: String,
    pub reducer: Reducer,
}

impl Measure {
    pub fn new(column: &str, reducer: Reducer) -> Self {
        Self {
            column: column.to_string(),
            reducer,
        }
    }

    pub fn sum(column: &str) -> Self {
        Self::new(column, Reducer::Sum)
    }

    pub fn mean(column: &str) -> Self {
        Self::new(column, Reducer::Mean)
    }

    pub fn count(column: &str) -> Self {
        Self::new(column, Reducer::Count)
    }

    /// Parses `Column` or `Column:reducer`; the reducer defaults to sum.
    pub fn parse(spec: &str) -> Result<Self> {
        let trimmed = spec.trim();
        let (column, reducer) = match trimmed.rsplit_once(':') {
            Some((column, reducer)) => (column.trim(), reducer.parse::<Reducer>()?),
            None => (trimmed, Reducer::Sum),
        };
        ensure!(!column.is_empty(), "Measure '{spec}' is missing a column name");
        Ok(Self::new(column, reducer))
    }

    /// Sums keep the source column name; other reducers are suffixed.
    pub fn output_name(&self) -> String {
        match self.reducer {
            Reducer::Sum => self.column.clone(),
            other => format!("{} ({other})", self.column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    pub column: String,
    pub direction: SortDirection,
}

impl SortDirective {
    pub fn descending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Desc,
        }
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.rsplitn(2, ':');
        let last = parts.next().unwrap_or("").trim();
        let (column, direction) = match (parts.next(), last.to_ascii_lowercase().as_str()) {
            (Some(column), "asc") => (column.trim(), SortDirection::Asc),
            (Some(column), "desc") => (column.trim(), SortDirection::Desc),
            (Some(_), other) => bail!("Unknown sort direction '{other}' in '{spec}'"),
            (None, _) => (last, SortDirection::Asc),
        };
        ensure!(!column.is_empty(), "Sort directive '{spec}' is missing a column name");
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn finish(&self, reducer: Reducer) -> Cell {
        match reducer {
            Reducer::Sum => Some(Value::Number(self.sum)),
            Reducer::Mean => {
                (self.count > 0).then(|| Value::Number(self.sum / self.count as f64))
            }
            Reducer::Count => Some(Value::Integer(self.count as i64)),
        }
    }
}

struct Group {
    key: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

/// Groups `table` by `group_by` and reduces each measure per group.
pub fn aggregate(
    table: &RecordTable,
    group_by: &[String],
    measures: &[Measure],
) -> Result<RecordTable> {
    let key_indices = group_by
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| anyhow!("Group column '{name}' not found"))
        })
        .collect::<Result<Vec<_>>>()?;
    let measure_indices = measures
        .iter()
        .map(|measure| {
            let idx = table
                .column_index(&measure.column)
                .ok_or_else(|| anyhow!("Measure column '{}' not found", measure.column))?;
            if measure.reducer != Reducer::Count && !table.is_numeric_column(&measure.column) {
                bail!(
                    "Measure column '{}' is not numeric and cannot be reduced with {}",
                    measure.column,
                    measure.reducer
                );
            }
            Ok(idx)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut groups: Vec<Group> = Vec::new();
    let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
    if key_indices.is_empty() {
        groups.push(Group {
            key: Vec::new(),
            accumulators: vec![Accumulator::default(); measures.len()],
        });
        positions.insert(Vec::new(), 0);
    }

    let mut dropped = 0usize;
    for row in table.rows() {
        let Some(key) = key_indices
            .iter()
            .map(|&idx| row[idx].clone())
            .collect::<Option<Vec<Value>>>()
        else {
            dropped += 1;
            continue;
        };
        let lookup = key.iter().map(Value::as_display).collect::<Vec<_>>();
        let position = *positions.entry(lookup).or_insert_with(|| {
            groups.push(Group {
                key,
                accumulators: vec![Accumulator::default(); measures.len()],
            });
            groups.len() - 1
        });
        let group = &mut groups[position];
        for (acc, (&idx, measure)) in group
            .accumulators
            .iter_mut()
            .zip(measure_indices.iter().zip(measures))
        {
            match (&row[idx], measure.reducer) {
                (None, _) => {}
                (Some(_), Reducer::Count) => acc.add(0.0),
                (Some(value), _) => {
                    if let Some(number) = value.as_f64() {
                        acc.add(number);
                    }
                }
            }
        }
    }
    if dropped > 0 {
        debug!(
            "{dropped} row(s) with a missing value in [{}] left out of grouping",
            group_by.iter().join(", ")
        );
    }

    let headers = group_by
        .iter()
        .cloned()
        .chain(measures.iter().map(Measure::output_name))
        .collect();
    let rows = groups
        .into_iter()
        .map(|group| {
            group
                .key
                .into_iter()
                .map(Some)
                .chain(
                    group
                        .accumulators
                        .iter()
                        .zip(measures)
                        .map(|(acc, measure)| acc.finish(measure.reducer)),
                )
                .collect()
        })
        .collect();
    Ok(RecordTable::new(headers, rows))
}

/// Stable sort; missing values go last in either direction.
pub fn sort_table(mut table: RecordTable, directive: &SortDirective) -> Result<RecordTable> {
    let idx = table
        .column_index(&directive.column)
        .ok_or_else(|| anyhow!("Sort column '{}' not found", directive.column))?;
    table.sort_rows_by(|a, b| {
        let (left, right) = (a[idx].as_ref(), b[idx].as_ref());
        match (directive.direction, left.is_some() && right.is_some()) {
            (SortDirection::Desc, true) => compare_cells(right, left),
            _ => compare_cells(left, right),
        }
    });
    Ok(table)
}

pub fn top_n(mut table: RecordTable, n: usize) -> RecordTable {
    table.truncate(n);
    table
}

/// Sum of a column skipping missing values; `None` when the column is absent.
pub fn total(table: &RecordTable, column: &str) -> Option<f64> {
    table
        .numeric_column(column)
        .map(|values| values.into_iter().flatten().sum())
}

pub fn execute(args: &AggregateArgs) -> Result<()> {
    let prepared = crate::load_prepared(&args.source)?;
    let selection = crate::resolve_selection(&args.filters)?;
    let filtered = crate::current_view(&prepared, &selection, &args.filters);

    let group_by = args
        .group_by
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    let measures = args
        .measures
        .iter()
        .map(|spec| Measure::parse(spec))
        .collect::<Result<Vec<_>>>()?;
    ensure!(!measures.is_empty(), "Provide at least one --measure");

    let mut result = aggregate(&filtered, &group_by, &measures)
        .with_context(|| format!("Aggregating {:?}", args.source.input))?;
    if let Some(spec) = &args.sort {
        result = sort_table(result, &SortDirective::parse(spec)?)?;
    }
    if let Some(n) = args.top {
        result = top_n(result, n);
    }

    if let Some(path) = &args.output {
        let delimiter = io_utils::resolve_output_delimiter(Some(path), None, b',');
        io_utils::write_table(path, &result, delimiter)?;
    } else {
        match args.format {
            OutputFormat::Table => print!("{}", table::render_record_table(&result)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        }
    }
    info!(
        "Aggregated {} row(s) into {} group(s)",
        filtered.row_count(),
        result.row_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_by_segment() -> RecordTable {
        RecordTable::new(
            vec!["Segment".into(), "Sales".into()],
            vec![
                vec![Some(Value::text("A")), Some(Value::Number(10.0))],
                vec![Some(Value::text("A")), Some(Value::Number(20.0))],
                vec![Some(Value::text("B")), Some(Value::Number(5.0))],
            ],
        )
    }

    #[test]
    fn groups_in_first_seen_order() {
        let result = aggregate(
            &sales_by_segment(),
            &["Segment".to_string()],
            &[Measure::sum("Sales")],
        )
        .unwrap();
        assert_eq!(
            result.rows(),
            &[
                vec![Some(Value::text("A")), Some(Value::Number(30.0))],
                vec![Some(Value::text("B")), Some(Value::Number(5.0))],
            ]
        );
    }

    #[test]
    fn missing_measures_are_skipped_not_zeroed() {
        let table = RecordTable::new(
            vec!["Segment".into(), "Sales".into()],
            vec![
                vec![Some(Value::text("A")), Some(Value::Number(10.0))],
                vec![Some(Value::text("A")), None],
                vec![Some(Value::text("B")), None],
            ],
        );
        let result = aggregate(
            &table,
            &["Segment".to_string()],
            &[Measure::mean("Sales"), Measure::count("Sales")],
        )
        .unwrap();
        assert_eq!(result.headers(), &["Segment", "Sales (mean)", "Sales (count)"]);
        assert_eq!(result.cell(0, 1), Some(&Value::Number(10.0)));
        assert_eq!(result.cell(0, 2), Some(&Value::Integer(1)));
        assert_eq!(result.cell(1, 1), None);
        assert_eq!(result.cell(1, 2), Some(&Value::Integer(0)));
    }

    #[test]
    fn no_grouping_columns_yields_one_row() {
        let result = aggregate(&sales_by_segment(), &[], &[Measure::sum("Sales")]).unwrap();
        assert_eq!(result.rows(), &[vec![Some(Value::Number(35.0))]]);
        let empty = sales_by_segment().filter_rows(|_| false);
        let result = aggregate(&empty, &[], &[Measure::sum("Sales")]).unwrap();
        assert_eq!(result.rows(), &[vec![Some(Value::Number(0.0))]]);
    }

    #[test]
    fn rows_with_missing_keys_are_left_out() {
        let table = RecordTable::new(
            vec!["Segment".into(), "Sales".into()],
            vec![
                vec![None, Some(Value::Number(10.0))],
                vec![Some(Value::text("B")), Some(Value::Number(5.0))],
            ],
        );
        let result = aggregate(&table, &["Segment".to_string()], &[Measure::sum("Sales")]).unwrap();
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn unknown_or_text_measures_are_errors() {
        let table = sales_by_segment();
        assert!(aggregate(&table, &[], &[Measure::sum("Profit")]).is_err());
        assert!(aggregate(&table, &[], &[Measure::sum("Segment")]).is_err());
        assert!(aggregate(&table, &[], &[Measure::count("Segment")]).is_ok());
        assert!(aggregate(&table, &["Country".to_string()], &[Measure::count("Sales")]).is_err());
    }

    #[test]
    fn sort_descending_keeps_missing_last() {
        let table = RecordTable::new(
            vec!["Product".into(), "Margin".into()],
            vec![
                vec![Some(Value::text("a")), Some(Value::Number(0.1))],
                vec![Some(Value::text("b")), None],
                vec![Some(Value::text("c")), Some(Value::Number(0.3))],
            ],
        );
        let sorted = sort_table(table, &SortDirective::descending("Margin")).unwrap();
        let order = sorted
            .column("Product")
            .unwrap()
            .map(|v| v.unwrap().as_display())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(top_n(sorted, 1).row_count(), 1);
    }

    #[test]
    fn parses_measure_and_sort_specs() {
        assert_eq!(Measure::parse("Sales").unwrap(), Measure::sum("Sales"));
        assert_eq!(
            Measure::parse("Profit Margin:mean").unwrap(),
            Measure::mean("Profit Margin")
        );
        assert!(Measure::parse("Sales:median").is_err());
        assert_eq!(
            SortDirective::parse("Sales:desc").unwrap(),
            SortDirective::descending("Sales")
        );
        assert_eq!(
            SortDirective::parse("Sales").unwrap().direction,
            SortDirection::Asc
        );
        assert!(SortDirective::parse("Sales:sideways").is_err());
    }

    #[test]
    fn total_distinguishes_absent_from_zero() {
        let table = sales_by_segment();
        assert_eq!(total(&table, "Sales"), Some(35.0));
        assert_eq!(total(&table, "Profit"), None);
        assert_eq!(total(&table.filter_rows(|_| false), "Sales"), Some(0.0));
    }
}
