//! Derived metrics computed from the cleaned measures.
//!
//! Formulas run in table order and only when every input column is present.
//! Division by zero yields a missing value.

use log::{debug, warn};

use crate::{
    data::Value,
    record::{Cell, RecordTable},
    schema,
};

pub const PROFIT_MARGIN: &str = "Profit Margin";
pub const COGS_TO_SALES: &str = "COGS to Sales";
pub const NET_SALES: &str = "Net Sales";
pub const CUMULATIVE_SALES: &str = "Cumulative Sales";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formula {
    /// `numerator / denominator`; a zero denominator yields missing.
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
    },
    Difference {
        minuend: &'static str,
        subtrahend: &'static str,
    },
    /// Running total over the current row order.
    RunningTotal { source: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedField {
    pub name: &'static str,
    pub formula: Formula,
}

pub const DERIVED_FIELDS: [DerivedField; 4] = [
    DerivedField {
        name: PROFIT_MARGIN,
        formula: Formula::Ratio {
            numerator: schema::PROFIT,
            denominator: schema::SALES,
        },
    },
    DerivedField {
        name: COGS_TO_SALES,
        formula: Formula::Ratio {
            numerator: schema::COGS,
            denominator: schema::SALES,
        },
    },
    DerivedField {
        name: NET_SALES,
        formula: Formula::Difference {
            minuend: schema::GROSS_SALES,
            subtrahend: schema::DISCOUNTS,
        },
    },
    DerivedField {
        name: CUMULATIVE_SALES,
        formula: Formula::RunningTotal {
            source: schema::SALES,
        },
    },
];

impl DerivedField {
    pub fn sources(&self) -> Vec<&'static str> {
        match self.formula {
            Formula::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            Formula::Difference {
                minuend,
                subtrahend,
            } => vec![minuend, subtrahend],
            Formula::RunningTotal { source } => vec![source],
        }
    }

    /// Whether every source column exists and holds only numeric values.
    pub fn applies_to(&self, table: &RecordTable) -> bool {
        let sources = self.sources();
        if !table.has_columns(&sources) {
            debug!(
                "Skipping '{}': requires column(s) {}",
                self.name,
                sources.join(", ")
            );
            return false;
        }
        if let Some(bad) = sources.iter().find(|s| !table.is_numeric_column(s)) {
            warn!(
                "Skipping '{}': column '{bad}' holds non-numeric values",
                self.name
            );
            return false;
        }
        true
    }

    /// Computes the column; callers must check [`DerivedField::applies_to`] first.
    pub fn compute(&self, table: &RecordTable) -> Vec<Cell> {
        let column = |name: &str| table.numeric_column(name).unwrap_or_default();
        let values: Vec<Option<f64>> = match self.formula {
            Formula::Ratio {
                numerator,
                denominator,
            } => column(numerator)
                .into_iter()
                .zip(column(denominator))
                .map(|(num, den)| safe_ratio(num, den))
                .collect(),
            Formula::Difference {
                minuend,
                subtrahend,
            } => column(minuend)
                .into_iter()
                .zip(column(subtrahend))
                .map(|(left, right)| Some(left? - right?))
                .collect(),
            Formula::RunningTotal { source } => running_total(&column(source)),
        };
        values.into_iter().map(|v| v.map(Value::Number)).collect()
    }
}

/// Division with the missing-on-zero policy: never infinity, NaN or zero.
pub fn safe_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (num, den) = (numerator?, denominator?);
    if den == 0.0 {
        return None;
    }
    Some(num / den).filter(|ratio| ratio.is_finite())
}

/// Missing inputs produce a missing total for that row without resetting the sum.
pub fn running_total(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    values
        .iter()
        .map(|value| {
            value.map(|v| {
                total += v;
                total
            })
        })
        .collect()
}

/// Applies every standard derived field whose preconditions hold, in order.
pub fn apply_derived_fields(mut table: RecordTable) -> RecordTable {
    for field in &DERIVED_FIELDS {
        if field.applies_to(&table) {
            let values = field.compute(&table);
            table.set_column(field.name, values);
            debug!("Derived '{}'", field.name);
        }
    }
    table
}

/// Restarts the running sales total over an already filtered view.
///
/// Prepared tables carry a total computed once over the full upload. The
/// `--recompute-cumulative` flag applies this to the filtered view.
pub fn recompute_cumulative_sales(mut table: RecordTable) -> RecordTable {
    let Some(sales) = table.numeric_column(schema::SALES) else {
        return table;
    };
    let totals = running_total(&sales)
        .into_iter()
        .map(|v| v.map(Value::Number))
        .collect();
    table.set_column(CUMULATIVE_SALES, totals);
    table
}
