mod common;

use common::{TestWorkspace, prepared_sample};
use fin_report::{
    aggregate::{Measure, aggregate, total},
    data::Value,
    derive::{CUMULATIVE_SALES, NET_SALES, PROFIT_MARGIN},
    filter::{DateRange, FILTER_COLUMNS, FilterSelection, apply_filters},
    pipeline,
    record::RecordTable,
    report::{ReportStatus, build_report},
    schema::AliasMap,
    temporal::QUARTER,
    upload::{self, UploadOptions},
};

fn text_row(values: &[&str]) -> Vec<Option<Value>> {
    values.iter().map(|v| Some(Value::text(*v))).collect()
}

#[test]
fn currency_text_becomes_margins() {
    let raw = RecordTable::new(
        vec!["Sales".into(), "Profit".into()],
        vec![text_row(&["$100", "$20"]), text_row(&["$0", "$5"])],
    );
    let prepared = pipeline::prepare(raw, &AliasMap::builtin());
    assert_eq!(
        prepared.numeric_column("Sales").unwrap(),
        vec![Some(100.0), Some(0.0)]
    );
    assert_eq!(
        prepared.numeric_column("Profit").unwrap(),
        vec![Some(20.0), Some(5.0)]
    );
    assert_eq!(
        prepared.numeric_column(PROFIT_MARGIN).unwrap(),
        vec![Some(0.2), None]
    );
}

#[test]
fn padded_headers_normalize_and_canonical_ones_stay() {
    let raw = RecordTable::new(
        vec![" Sales ".into(), "Profit".into()],
        vec![text_row(&["1", "2"])],
    );
    let prepared = pipeline::normalize(raw, &AliasMap::builtin());
    assert_eq!(prepared.headers(), &["Sales".to_string(), "Profit".to_string()]);
}

#[test]
fn sample_upload_is_cleaned_end_to_end() {
    let prepared = prepared_sample();
    assert_eq!(prepared.row_count(), 7);
    for column in [NET_SALES, CUMULATIVE_SALES, QUARTER, "Year", "Month Name"] {
        assert!(prepared.has_column(column), "missing {column}");
    }
    let profit = prepared.numeric_column("Profit").unwrap();
    assert_eq!(profit[6], Some(-27500.0));
    let discounts = prepared.numeric_column("Discounts").unwrap();
    assert_eq!(discounts[0], Some(0.0));
    let margin = prepared.numeric_column(PROFIT_MARGIN).unwrap();
    assert_eq!(margin[5], None);
    let date = prepared.column_index("Date").unwrap();
    assert_eq!(prepared.cell(6, date), None);
    let quarter = prepared.column_index(QUARTER).unwrap();
    assert_eq!(prepared.cell(3, quarter), Some(&Value::text("2013 Q4")));
}

#[test]
fn cumulative_sales_keep_upload_order_after_filtering() {
    let prepared = prepared_sample();
    let selection = FilterSelection::new().with_values("Country", ["Germany"]);
    let view = pipeline::view(&prepared, &selection);
    assert_eq!(
        view.numeric_column(CUMULATIVE_SALES).unwrap(),
        vec![Some(58790.0), Some(529097.75)]
    );
}

#[test]
fn filtering_is_idempotent() {
    let prepared = prepared_sample();
    let range = DateRange::new(
        chrono::NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
        chrono::NaiveDate::from_ymd_opt(2014, 12, 31).unwrap(),
    )
    .unwrap();
    let selection = FilterSelection::new()
        .with_values("Segment", ["Government", "Channel Partners", "Midmarket"])
        .with_date_range(range);
    let once = apply_filters(&prepared, &selection);
    let twice = apply_filters(&once, &selection);
    assert_eq!(once, twice);
    assert_eq!(once.row_count(), 4);
}

#[test]
fn select_all_reproduces_the_prepared_table() {
    let prepared = prepared_sample();
    let selection = FilterSelection::select_all(&prepared, FILTER_COLUMNS);
    let view = apply_filters(&prepared, &selection);
    assert_eq!(view.row_count(), 7);
    assert_eq!(view, prepared);
}

#[test]
fn single_group_sum_matches_ungrouped_total() {
    let prepared = prepared_sample();
    let selection = FilterSelection::new().with_values("Country", ["Mexico"]);
    let view = pipeline::view(&prepared, &selection);
    let grouped = aggregate(&view, &["Country".to_string()], &[Measure::sum("Sales")]).unwrap();
    assert_eq!(grouped.row_count(), 1);
    assert_eq!(grouped.cell(0, 1).and_then(Value::as_f64), total(&view, "Sales"));
}

#[test]
fn missing_optional_columns_degrade_gracefully() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("thin.csv", "Country,Sales\nCanada,$10\nFrance,oops\n");
    let raw = upload::load(&path, &UploadOptions::default()).unwrap();
    let prepared = pipeline::prepare(raw, &AliasMap::builtin());
    assert!(!prepared.has_column(PROFIT_MARGIN));
    assert!(!prepared.has_column("Year"));
    assert_eq!(
        prepared.numeric_column("Sales").unwrap(),
        vec![Some(10.0), None]
    );

    let range = DateRange::from_bounds(chrono::NaiveDate::from_ymd_opt(2014, 1, 1), None)
        .unwrap()
        .unwrap();
    let selection = FilterSelection::new()
        .with_values("Segment", ["Government"])
        .with_date_range(range);
    let view = pipeline::view(&prepared, &selection);
    assert_eq!(view.row_count(), 2);

    let report = build_report(&view).unwrap();
    assert_eq!(report.status, ReportStatus::Ready);
    assert_eq!(report.kpis[0].value, Some(10.0));
    assert_eq!(report.kpis[1].value, None);
    let titles = report.charts.iter().map(|c| c.title).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Sales and Profit by Country"]);
}
