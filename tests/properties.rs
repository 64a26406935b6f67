use fin_report::{
    aggregate::{Measure, aggregate, total},
    coerce::parse_amount,
    data::Value,
    derive::{PROFIT_MARGIN, apply_derived_fields},
    filter::{FilterSelection, apply_filters},
    record::RecordTable,
};
use proptest::prelude::*;

fn sales_profit_table(rows: &[(Option<i32>, i32)]) -> RecordTable {
    RecordTable::new(
        vec!["Sales".into(), "Profit".into()],
        rows.iter()
            .map(|(sales, profit)| {
                vec![
                    sales.map(|s| Value::Number(s as f64)),
                    Some(Value::Number(*profit as f64)),
                ]
            })
            .collect(),
    )
}

fn segment_table(rows: &[(u8, i32)]) -> RecordTable {
    RecordTable::new(
        vec!["Segment".into(), "Sales".into()],
        rows.iter()
            .map(|(segment, sales)| {
                vec![
                    Some(Value::Text(format!("S{segment}"))),
                    Some(Value::Number(*sales as f64)),
                ]
            })
            .collect(),
    )
}

fn dated_segment_table(rows: &[(Option<u8>, i32, Option<u16>)]) -> RecordTable {
    let base = chrono::NaiveDate::from_ymd_opt(2013, 1, 1).expect("valid date");
    RecordTable::new(
        vec!["Segment".into(), "Sales".into(), "Date".into()],
        rows.iter()
            .map(|(segment, sales, offset)| {
                vec![
                    segment.map(|s| Value::Text(format!("S{s}"))),
                    Some(Value::Number(*sales as f64)),
                    offset.map(|days| Value::Date(base + chrono::Days::new(u64::from(days)))),
                ]
            })
            .collect(),
    )
}

proptest! {
    #[test]
    fn profit_margin_is_missing_exactly_when_sales_are_missing_or_zero(
        rows in proptest::collection::vec(
            (proptest::option::of(-1_000i32..=1_000), -1_000i32..=1_000),
            0..40,
        )
    ) {
        let derived = apply_derived_fields(sales_profit_table(&rows));
        let margins = derived.numeric_column(PROFIT_MARGIN).expect("margin column");
        for ((sales, profit), margin) in rows.iter().zip(margins) {
            match sales {
                None | Some(0) => prop_assert!(margin.is_none()),
                Some(s) => {
                    let expected = *profit as f64 / *s as f64;
                    let actual = margin.expect("margin present");
                    prop_assert!((actual - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn filtering_twice_equals_filtering_once(
        rows in proptest::collection::vec((0u8..5, -500i32..500), 0..30),
        picked in proptest::collection::vec(0u8..5, 0..4),
    ) {
        let table = segment_table(&rows);
        let selection = FilterSelection::new()
            .with_values("Segment", picked.iter().map(|s| format!("S{s}")));
        let once = apply_filters(&table, &selection);
        let twice = apply_filters(&once, &selection);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn selecting_every_value_is_the_identity(
        rows in proptest::collection::vec(
            (
                proptest::option::of(0u8..5),
                -500i32..500,
                proptest::option::of(0u16..730),
            ),
            0..30,
        ),
    ) {
        let table = dated_segment_table(&rows);
        let selection = FilterSelection::select_all(&table, &["Segment"]);
        prop_assert_eq!(apply_filters(&table, &selection), table);
    }

    #[test]
    fn group_sums_add_up_to_the_total(
        rows in proptest::collection::vec((0u8..4, -500i32..500), 1..30),
    ) {
        let table = segment_table(&rows);
        let grouped = aggregate(&table, &["Segment".to_string()], &[Measure::sum("Sales")])
            .expect("aggregate");
        let group_total: f64 = grouped
            .numeric_column("Sales")
            .expect("sales column")
            .into_iter()
            .flatten()
            .sum();
        prop_assert_eq!(Some(group_total), total(&table, "Sales"));
    }

    #[test]
    fn formatted_amounts_parse_back(cents in -100_000_000i64..100_000_000) {
        let amount = cents as f64 / 100.0;
        let magnitude = format!("{:.2}", amount.abs());
        let (whole, fraction) = magnitude.split_once('.').expect("decimal point");
        let grouped = whole
            .as_bytes()
            .rchunks(3)
            .rev()
            .map(|chunk| std::str::from_utf8(chunk).expect("ascii digits"))
            .collect::<Vec<_>>()
            .join(",");
        let rendered = if amount < 0.0 {
            format!("$({grouped}.{fraction})")
        } else {
            format!("${grouped}.{fraction}")
        };
        let parsed = parse_amount(&rendered).expect("parses");
        prop_assert!((parsed - amount).abs() < 1e-9);
    }
}
