//! Date parsing and calendar attributes.
//!
//! When the table carries a `Date` column its cells are parsed in place and
//! `Year`, `Month Name` and `Quarter` are derived per row. Unparseable dates
//! become missing and so do their derived attributes; the row itself stays.
//! Without a `Date` column none of the derived columns are created.

use chrono::{Datelike, NaiveDate};
use log::debug;

use crate::{
    data::{Value, excel_serial_to_date, parse_naive_date},
    record::{Cell, RecordTable},
    schema,
};

pub const QUARTER: &str = "Quarter";

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn month_name(date: NaiveDate) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

/// Quarter label in `YYYY Q#` form.
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{} Q{}", date.year(), date.month0() / 3 + 1)
}

pub fn parse_date_cell(cell: Option<&Value>) -> Option<NaiveDate> {
    match cell? {
        Value::Date(d) => Some(*d),
        Value::Text(raw) => parse_naive_date(raw).ok(),
        Value::Number(serial) => excel_serial_to_date(*serial),
        Value::Integer(serial) => excel_serial_to_date(*serial as f64),
    }
}

pub fn enrich_dates(mut table: RecordTable) -> RecordTable {
    let Some(dates) = table
        .column(schema::DATE)
        .map(|cells| cells.map(parse_date_cell).collect::<Vec<_>>())
    else {
        debug!("No '{}' column; calendar attributes unavailable", schema::DATE);
        return table;
    };

    let unparsed = table
        .column(schema::DATE)
        .into_iter()
        .flatten()
        .zip(&dates)
        .filter(|(cell, parsed)| cell.is_some() && parsed.is_none())
        .count();
    if unparsed > 0 {
        debug!("{unparsed} date value(s) could not be parsed and are now missing");
    }

    let column = |f: &dyn Fn(NaiveDate) -> Value| -> Vec<Cell> {
        dates.iter().map(|date| date.map(f)).collect()
    };
    let parsed = column(&Value::Date);
    let years = column(&|d| Value::Integer(d.year() as i64));
    let months = column(&|d| Value::text(month_name(d)));
    let quarters = column(&|d| Value::Text(quarter_label(d)));

    table.set_column(schema::DATE, parsed);
    table.set_column(schema::YEAR, years);
    table.set_column(schema::MONTH_NAME, months);
    table.set_column(QUARTER, quarters);
    table
}

/// Earliest and latest parsed date, if the table has any.
pub fn date_bounds(table: &RecordTable) -> Option<(NaiveDate, NaiveDate)> {
    let cells = table.column(schema::DATE)?;
    cells
        .filter_map(parse_date_cell)
        .fold(None, |bounds, date| match bounds {
            None => Some((date, date)),
            Some((lo, hi)) => Some((lo.min(date), hi.max(date))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(values: &[Option<&str>]) -> RecordTable {
        RecordTable::new(
            vec!["Date".into(), "Sales".into()],
            values
                .iter()
                .map(|v| vec![v.map(Value::text), Some(Value::Number(1.0))])
                .collect(),
        )
    }

    #[test]
    fn quarter_labels_follow_calendar_quarters() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(quarter_label(date), "2024 Q1");
        let date = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(quarter_label(date), "2023 Q4");
        assert_eq!(month_name(date), "December");
    }

    #[test]
    fn derives_calendar_columns_and_keeps_bad_rows() {
        let table = enrich_dates(dated(&[Some("2023-01-15"), Some("garbage"), None]));
        assert_eq!(table.row_count(), 3);
        let year = table.column_index("Year").unwrap();
        let month = table.column_index("Month Name").unwrap();
        let quarter = table.column_index("Quarter").unwrap();
        assert_eq!(table.cell(0, year), Some(&Value::Integer(2023)));
        assert_eq!(table.cell(0, month), Some(&Value::text("January")));
        assert_eq!(table.cell(0, quarter), Some(&Value::text("2023 Q1")));
        assert_eq!(table.cell(1, 0), None);
        assert_eq!(table.cell(1, year), None);
        assert_eq!(table.cell(2, month), None);
    }

    #[test]
    fn absent_date_column_adds_nothing() {
        let table = RecordTable::new(vec!["Sales".into()], vec![vec![None]]);
        let enriched = enrich_dates(table);
        assert_eq!(enriched.headers(), &["Sales".to_string()]);
    }

    #[test]
    fn derived_year_overwrites_existing_column() {
        let table = RecordTable::new(
            vec!["Date".into(), "Year".into()],
            vec![vec![Some(Value::text("2014-06-01")), Some(Value::text(" 2014 "))]],
        );
        let enriched = enrich_dates(table);
        assert_eq!(enriched.headers().len(), 4);
        assert_eq!(enriched.cell(0, 1), Some(&Value::Integer(2014)));
    }

    #[test]
    fn bounds_cover_parsed_dates_only() {
        let table = enrich_dates(dated(&[Some("2023-03-01"), Some("bad"), Some("2023-01-05")]));
        let (lo, hi) = date_bounds(&table).unwrap();
        assert_eq!(lo, NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
        assert_eq!(hi, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap());
        assert!(date_bounds(&dated(&[None])).is_none());
    }
}
