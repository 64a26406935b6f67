use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::filter::parse_cli_date;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean, enrich and summarise financial sales reports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print KPIs, the profit-and-loss summary and chart tables
    Report(ReportArgs),
    /// Group the cleaned table and reduce measure columns
    Aggregate(AggregateArgs),
    /// Preview cleaned and filtered rows in a formatted table
    Preview(PreviewArgs),
    /// List filter options: distinct values per column and the date span
    Options(OptionsArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input file (.csv, .tsv, .xlsx, .xls, .ods; '-' reads CSV from stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter for text input (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Worksheet to read from a spreadsheet (defaults to the first)
    #[arg(long)]
    pub sheet: Option<String>,
    /// YAML file with extra header aliases merged over the built-in map
    #[arg(long)]
    pub aliases: Option<PathBuf>,
}

#[derive(Debug, Default, Args)]
pub struct FilterArgs {
    /// Repeatable categorical selections such as `Country=Canada,France`
    #[arg(long = "select", action = clap::ArgAction::Append)]
    pub selects: Vec<String>,
    /// Keep rows dated on or after this day
    #[arg(long = "date-from", value_parser = parse_cli_date)]
    pub date_from: Option<NaiveDate>,
    /// Keep rows dated on or before this day
    #[arg(long = "date-to", value_parser = parse_cli_date)]
    pub date_to: Option<NaiveDate>,
    /// YAML selection file; command-line selections override its entries
    #[arg(long)]
    pub selection: Option<PathBuf>,
    /// Restart Cumulative Sales over the filtered rows
    #[arg(long = "recompute-cumulative")]
    pub recompute_cumulative: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub source: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Grouping columns, comma separated or repeated
    #[arg(short = 'g', long = "group-by", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub group_by: Vec<String>,
    /// Repeatable measures such as `Sales`, `Profit:mean` or `Units Sold:count`
    #[arg(short = 'm', long = "measure", action = clap::ArgAction::Append, required = true)]
    pub measures: Vec<String>,
    /// Sort directive such as `Sales:desc`
    #[arg(long)]
    pub sort: Option<String>,
    /// Keep only the first N groups after sorting
    #[arg(long)]
    pub top: Option<usize>,
    /// Output format when printing to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Write the aggregated table as CSV instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Write all matching rows as CSV instead of printing a preview
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Output format when printing to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub source: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Columns to list (defaults to every filterable column present)
    #[arg(short = 'C', long = "columns", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub columns: Vec<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
