//! Stage wiring. An upload runs [`prepare`] once; each filter change only
//! re-runs [`view`] and whatever summarises its result.

use log::debug;

use crate::{
    coerce,
    derive,
    filter::{self, FilterSelection},
    record::RecordTable,
    schema::{self, AliasMap},
    temporal,
};

pub fn normalize(raw: RecordTable, aliases: &AliasMap) -> RecordTable {
    schema::normalize_table(raw, aliases)
}

pub fn coerce(table: RecordTable) -> RecordTable {
    coerce::coerce_numeric_columns(table)
}

pub fn enrich_dates(table: RecordTable) -> RecordTable {
    temporal::enrich_dates(table)
}

pub fn derive_metrics(table: RecordTable) -> RecordTable {
    derive::apply_derived_fields(table)
}

/// Normalise, coerce, enrich and derive. Cumulative totals reflect upload order.
pub fn prepare(raw: RecordTable, aliases: &AliasMap) -> RecordTable {
    let table = derive_metrics(enrich_dates(coerce(normalize(raw, aliases))));
    debug!(
        "Prepared {} row(s) with columns: {}",
        table.row_count(),
        table.headers().join(", ")
    );
    table
}

pub fn view(prepared: &RecordTable, selection: &FilterSelection) -> RecordTable {
    filter::apply_filters(prepared, selection)
}
