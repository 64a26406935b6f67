//! Numeric coercion for the currency/quantity columns.
//!
//! Currency symbols and thousands separators are stripped, a lone `-`
//! placeholder counts as zero, accounting parentheses mark negatives, and
//! anything else that fails to parse becomes missing. Coercion never fails
//! and never turns garbage into zero.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::{
    data::Value,
    record::{Cell, RecordTable},
    schema,
};

pub const NUMERIC_COLUMNS: &[&str] = &[
    schema::UNITS_SOLD,
    schema::MANUFACTURING_PRICE,
    schema::SALE_PRICE,
    schema::GROSS_SALES,
    schema::DISCOUNTS,
    schema::SALES,
    schema::COGS,
    schema::PROFIT,
];

const ZERO_PLACEHOLDERS: &[&str] = &["-"];

fn currency_noise() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[$€£¥,]").expect("currency pattern compiles"))
}

/// Parses a raw amount such as `"$1,234.50"`, `" $-  "` or `"(12.00)"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let stripped = currency_noise().replace_all(raw, "");
    let mut body = stripped.trim();
    if body.is_empty() {
        return None;
    }
    if ZERO_PLACEHOLDERS.contains(&body) {
        return Some(0.0);
    }
    let negate = body.len() > 2 && body.starts_with('(') && body.ends_with(')');
    if negate {
        body = body[1..body.len() - 1].trim();
    }
    let parsed = body.parse::<f64>().ok().filter(|value| value.is_finite())?;
    Some(if negate { -parsed } else { parsed })
}

pub fn coerce_cell(cell: Cell) -> Cell {
    match cell? {
        Value::Text(raw) => parse_amount(&raw).map(Value::Number),
        Value::Integer(i) => Some(Value::Number(i as f64)),
        Value::Number(f) if f.is_finite() => Some(Value::Number(f)),
        Value::Number(_) | Value::Date(_) => None,
    }
}

/// Coerces every designated numeric column present in the table.
pub fn coerce_numeric_columns(mut table: RecordTable) -> RecordTable {
    for column in NUMERIC_COLUMNS {
        let mut lost = 0usize;
        let present = table.map_column(column, |cell| {
            let had_value = cell.is_some();
            let coerced = coerce_cell(cell);
            if had_value && coerced.is_none() {
                lost += 1;
            }
            coerced
        });
        if !present {
            debug!("Column '{column}' absent; skipping numeric coercion");
        } else if lost > 0 {
            debug!("Column '{column}': {lost} value(s) could not be parsed and are now missing");
        }
    }
    table
}
