//! Dashboard outputs computed from a filtered table: KPI scalars, the
//! profit-and-loss summary and one aggregated table per chart.
//!
//! Every figure degrades on its own when a column is absent: a KPI becomes
//! unavailable, a P&L line has no amount, a chart is left out.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;

use crate::{
    aggregate::{self, Measure, SortDirective},
    cli::{OutputFormat, ReportArgs},
    derive,
    record::RecordTable,
    schema::{self, COUNTRY, DISCOUNT_BAND, MONTH_NAME, PRODUCT, SALES, SEGMENT, YEAR},
    table,
};

const TOP_MARGIN_PRODUCTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub label: &'static str,
    pub column: &'static str,
    /// `None` when the source column is absent.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PnlLine {
    pub label: &'static str,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Heatmap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartTable {
    pub title: &'static str,
    pub kind: ChartKind,
    pub data: RecordTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ready,
    /// The current filters matched no rows.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub status: ReportStatus,
    pub row_count: usize,
    pub kpis: Vec<Kpi>,
    pub profit_and_loss: Vec<PnlLine>,
    pub charts: Vec<ChartTable>,
}

const KPI_COLUMNS: &[(&str, &str)] = &[
    ("Total Sales", schema::SALES),
    ("Total Profit", schema::PROFIT),
    ("Total COGS", schema::COGS),
    ("Total Discounts", schema::DISCOUNTS),
];

pub fn kpis(table: &RecordTable) -> Vec<Kpi> {
    KPI_COLUMNS
        .iter()
        .map(|&(label, column)| Kpi {
            label,
            column,
            value: aggregate::total(table, column),
        })
        .collect()
}

pub fn profit_and_loss(table: &RecordTable) -> Vec<PnlLine> {
    let sum = |column: &str| aggregate::total(table, column);
    let sales = sum(schema::SALES);
    let cogs = sum(schema::COGS);
    vec![
        PnlLine {
            label: "Total Revenue",
            amount: sum(schema::GROSS_SALES),
        },
        PnlLine {
            label: "Discounts",
            amount: sum(schema::DISCOUNTS),
        },
        PnlLine {
            label: "Net Sales",
            amount: sum(derive::NET_SALES),
        },
        PnlLine {
            label: "COGS",
            amount: cogs,
        },
        PnlLine {
            label: "Gross Profit",
            amount: sales.zip(cogs).map(|(s, c)| s - c),
        },
        PnlLine {
            label: "Operating Profit",
            amount: sum(schema::PROFIT),
        },
    ]
}

struct ChartSpec {
    title: &'static str,
    kind: ChartKind,
    group_by: &'static [&'static str],
    required: &'static [&'static str],
    measures: &'static [(&'static str, aggregate::Reducer)],
    sort_desc: Option<&'static str>,
    limit: Option<usize>,
}

const CHARTS: &[ChartSpec] = &[
    ChartSpec {
        title: "Sales and Profit by Country",
        kind: ChartKind::Bar,
        group_by: &[COUNTRY],
        required: &[],
        measures: &[
            (SALES, aggregate::Reducer::Sum),
            (schema::PROFIT, aggregate::Reducer::Sum),
        ],
        sort_desc: None,
        limit: None,
    },
    ChartSpec {
        title: "Monthly Sales Trends",
        kind: ChartKind::Line,
        group_by: &[YEAR, MONTH_NAME],
        required: &[],
        measures: &[
            (SALES, aggregate::Reducer::Sum),
            (schema::PROFIT, aggregate::Reducer::Sum),
        ],
        sort_desc: None,
        limit: None,
    },
    ChartSpec {
        title: "Sales by Product and Discount Band",
        kind: ChartKind::Heatmap,
        group_by: &[PRODUCT, DISCOUNT_BAND],
        required: &[],
        measures: &[(SALES, aggregate::Reducer::Sum)],
        sort_desc: None,
        limit: None,
    },
    ChartSpec {
        title: "Sales and Profit by Segment",
        kind: ChartKind::Bar,
        group_by: &[SEGMENT],
        required: &[],
        measures: &[
            (SALES, aggregate::Reducer::Sum),
            (schema::PROFIT, aggregate::Reducer::Sum),
        ],
        sort_desc: None,
        limit: None,
    },
    ChartSpec {
        title: "Top Products by Profit Margin",
        kind: ChartKind::Bar,
        group_by: &[PRODUCT],
        required: &[],
        measures: &[(derive::PROFIT_MARGIN, aggregate::Reducer::Mean)],
        sort_desc: Some("Profit Margin (mean)"),
        limit: Some(TOP_MARGIN_PRODUCTS),
    },
];

const SCATTER_COLUMNS: &[&str] = &[COUNTRY, schema::GROSS_SALES, schema::DISCOUNTS];

impl ChartSpec {
    /// Measures whose column is present; the first measure is mandatory.
    fn resolve(&self, table: &RecordTable) -> Option<Vec<Measure>> {
        if !table.has_columns(self.group_by) || !table.has_columns(self.required) {
            return None;
        }
        let (first, _) = self.measures.first()?;
        if !table.has_column(first) {
            return None;
        }
        Some(
            self.measures
                .iter()
                .filter(|(column, _)| table.has_column(column))
                .map(|&(column, reducer)| Measure::new(column, reducer))
                .collect(),
        )
    }

    fn build(&self, table: &RecordTable) -> Result<Option<ChartTable>> {
        let Some(measures) = self.resolve(table) else {
            debug!("Chart '{}' skipped: required columns absent", self.title);
            return Ok(None);
        };
        let group_by = self
            .group_by
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let mut data = aggregate::aggregate(table, &group_by, &measures)
            .with_context(|| format!("Building chart '{}'", self.title))?;
        if let Some(column) = self.sort_desc {
            data = aggregate::sort_table(data, &SortDirective::descending(column))?;
        }
        if let Some(limit) = self.limit {
            data = aggregate::top_n(data, limit);
        }
        Ok(Some(ChartTable {
            title: self.title,
            kind: self.kind,
            data,
        }))
    }
}

pub fn charts(table: &RecordTable) -> Result<Vec<ChartTable>> {
    let mut charts = Vec::new();
    for spec in CHARTS {
        if let Some(chart) = spec.build(table)? {
            charts.push(chart);
        }
    }
    if table.has_columns(SCATTER_COLUMNS) {
        charts.push(ChartTable {
            title: "Gross Sales vs Discounts",
            kind: ChartKind::Scatter,
            data: table.project(SCATTER_COLUMNS)?,
        });
    }
    Ok(charts)
}

pub fn build_report(filtered: &RecordTable) -> Result<Report> {
    let status = if filtered.is_empty() {
        ReportStatus::NoData
    } else {
        ReportStatus::Ready
    };
    Ok(Report {
        status,
        row_count: filtered.row_count(),
        kpis: kpis(filtered),
        profit_and_loss: profit_and_loss(filtered),
        charts: charts(filtered)?,
    })
}

/// `$1,234` style rendering with a leading minus for negatives.
pub fn format_money(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

fn format_optional(amount: Option<f64>) -> String {
    amount.map(format_money).unwrap_or_else(|| "unavailable".to_string())
}

pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    if report.status == ReportStatus::NoData {
        out.push_str("No data for current filters.\n");
        return out;
    }

    out.push_str("Key Performance Indicators\n");
    let rows = report
        .kpis
        .iter()
        .map(|kpi| vec![kpi.label.to_string(), format_optional(kpi.value)])
        .collect::<Vec<_>>();
    out.push_str(&table::render_table(&["metric".into(), "value".into()], &rows));

    out.push_str("\nProfit and Loss\n");
    let rows = report
        .profit_and_loss
        .iter()
        .map(|line| vec![line.label.to_string(), format_optional(line.amount)])
        .collect::<Vec<_>>();
    out.push_str(&table::render_table(&["line item".into(), "amount".into()], &rows));

    for chart in &report.charts {
        out.push_str(&format!("\n{} ({:?})\n", chart.title, chart.kind));
        out.push_str(&table::render_record_table(&chart.data));
    }
    out
}

pub fn execute(args: &ReportArgs) -> Result<()> {
    let prepared = crate::load_prepared(&args.source)?;
    let selection = crate::resolve_selection(&args.filters)?;
    let filtered = crate::current_view(&prepared, &selection, &args.filters);
    let report = build_report(&filtered)?;
    match args.format {
        OutputFormat::Table => print!("{}", render_report(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    info!(
        "Report over {} of {} row(s) with {} chart(s)",
        filtered.row_count(),
        prepared.row_count(),
        report.charts.len()
    );
    Ok(())
}
