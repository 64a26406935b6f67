//! Row selection by categorical value sets and an inclusive date range.
//!
//! A [`FilterSelection`] is an immutable value rebuilt by the caller on every
//! interaction. Active filters compose with AND. A categorical selection that
//! is present but empty matches nothing; callers wanting an unfiltered view
//! start from [`FilterSelection::select_all`]. Filters on columns the table
//! does not carry are skipped. A missing cell fails every active filter
//! unless the selection keeps missing values, which `select_all` does.

use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::{Context, Result, anyhow, ensure};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_naive_date},
    record::RecordTable,
    schema, temporal,
};

/// Columns offered as categorical filters when present.
pub const FILTER_COLUMNS: &[&str] = &[
    schema::SEGMENT,
    schema::COUNTRY,
    schema::PRODUCT,
    schema::DISCOUNT_BAND,
    schema::YEAR,
    schema::MONTH_NAME,
    temporal::QUARTER,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DateRangeSpec")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct DateRangeSpec {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<DateRangeSpec> for DateRange {
    type Error = String;

    fn try_from(spec: DateRangeSpec) -> std::result::Result<Self, Self::Error> {
        DateRange::new(spec.start, spec.end).map_err(|err| err.to_string())
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        ensure!(start <= end, "Date range start {start} is after end {end}");
        Ok(Self { start, end })
    }

    /// Overrides each side of `base` with the bound given for it.
    pub fn overlay(
        base: Option<DateRange>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Option<Self>> {
        Self::from_bounds(
            start.or(base.map(|range| range.start)),
            end.or(base.map(|range| range.end)),
        )
    }

    /// Range from optional bounds; a missing bound leaves that side open.
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Option<Self>> {
        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        Self::new(
            start.unwrap_or(NaiveDate::MIN),
            end.unwrap_or(NaiveDate::MAX),
        )
        .map(Some)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Rows with a missing value in a filtered column pass instead of failing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub keep_missing: bool,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.insert(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.date_range.is_none()
    }

    /// Every distinct value of each present filter column plus the full date
    /// span, keeping rows with missing values so the table comes back whole.
    pub fn select_all(table: &RecordTable, columns: &[&str]) -> Self {
        let categories = columns
            .iter()
            .filter(|column| table.has_column(column))
            .map(|column| {
                let values = table
                    .distinct_values(column)
                    .iter()
                    .map(Value::as_display)
                    .collect();
                (column.to_string(), values)
            })
            .collect();
        let date_range = temporal::date_bounds(table).map(|(start, end)| DateRange { start, end });
        Self {
            categories,
            date_range,
            keep_missing: true,
        }
    }

    /// Date range only; used to list options without narrowing categories.
    pub fn dates_only(&self) -> Self {
        Self {
            categories: BTreeMap::new(),
            date_range: self.date_range,
            keep_missing: self.keep_missing,
        }
    }

    /// Overlays `other` on `self`: its columns and date range win.
    pub fn merge(mut self, other: FilterSelection) -> Self {
        self.categories.extend(other.categories);
        self.keep_missing |= other.keep_missing;
        if other.date_range.is_some() {
            self.date_range = other.date_range;
        }
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Opening selection file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading selection file {path:?}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing selection file {path:?}"))
    }
}

/// Parses repeatable `Column=value1,value2` selections.
pub fn parse_selections(specs: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for spec in specs {
        let (column, values) = parse_selection(spec)?;
        categories.entry(column).or_default().extend(values);
    }
    Ok(categories)
}

fn parse_selection(spec: &str) -> Result<(String, Vec<String>)> {
    let (column, values) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Selection '{spec}' must look like Column=value1,value2"))?;
    let column = column.trim();
    ensure!(!column.is_empty(), "Selection '{spec}' is missing a column name");
    let values = values
        .split(',')
        .map(|v| unquote(v.trim()).to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Ok((column.to_string(), values))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn parse_cli_date(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_naive_date(value).map_err(|err| err.to_string())
}

struct CategoricalFilter {
    index: usize,
    allowed: HashSet<String>,
}

/// Returns the rows matching every active filter as a new table.
pub fn apply_filters(table: &RecordTable, selection: &FilterSelection) -> RecordTable {
    let categorical = selection
        .categories
        .iter()
        .filter_map(|(column, values)| match table.column_index(column) {
            Some(index) => Some(CategoricalFilter {
                index,
                allowed: values.iter().cloned().collect(),
            }),
            None => {
                debug!("Column '{column}' absent; ignoring its selection");
                None
            }
        })
        .collect::<Vec<_>>();

    let date_filter = selection
        .date_range
        .and_then(|range| match table.column_index(schema::DATE) {
            Some(index) => Some((index, range)),
            None => {
                debug!("No '{}' column; ignoring date range", schema::DATE);
                None
            }
        });

    let keep_missing = selection.keep_missing;
    let filtered = table.filter_rows(|row| {
        let categories_match = categorical.iter().all(|filter| {
            row[filter.index]
                .as_ref()
                .map_or(keep_missing, |value| {
                    filter.allowed.contains(&value.as_display())
                })
        });
        categories_match
            && date_filter.is_none_or(|(index, range)| {
                temporal::parse_date_cell(row[index].as_ref())
                    .map_or(keep_missing, |d| range.contains(d))
            })
    });
    debug!(
        "Filters kept {} of {} row(s)",
        filtered.row_count(),
        table.row_count()
    );
    filtered
}
