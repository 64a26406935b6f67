pub mod aggregate;
pub mod cli;
pub mod coerce;
pub mod data;
pub mod derive;
pub mod filter;
pub mod frequency;
pub mod io_utils;
pub mod pipeline;
pub mod preview;
pub mod record;
pub mod report;
pub mod schema;
pub mod table;
pub mod temporal;
pub mod upload;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, FilterArgs, InputArgs},
    filter::{DateRange, FilterSelection},
    record::RecordTable,
    schema::AliasMap,
    upload::UploadOptions,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("fin_report", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Report(args) => report::execute(&args),
        Commands::Aggregate(args) => aggregate::execute(&args),
        Commands::Preview(args) => preview::execute(&args),
        Commands::Options(args) => frequency::execute(&args),
    }
}

/// Reads the upload and runs the cleaning stages once.
pub(crate) fn load_prepared(args: &InputArgs) -> Result<RecordTable> {
    let options = UploadOptions {
        delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
        sheet: args.sheet.clone(),
    };
    if let Some(delimiter) = args.delimiter {
        debug!("Using delimiter '{}'", printable_delimiter(delimiter));
    }
    let raw = upload::load(&args.input, &options)
        .with_context(|| format!("Loading upload {:?}", args.input))?;
    let aliases = match &args.aliases {
        Some(path) => {
            AliasMap::load(path).with_context(|| format!("Loading aliases from {path:?}"))?
        }
        None => AliasMap::builtin(),
    };
    info!(
        "Loaded {} row(s) across {} column(s) from {:?}",
        raw.row_count(),
        raw.headers().len(),
        args.input
    );
    Ok(pipeline::prepare(raw, &aliases))
}

/// Builds the selection from an optional YAML file overlaid with flags.
///
/// `--select` replaces the file's entry for that column; each date flag
/// replaces only its own side of the file's range.
pub(crate) fn resolve_selection(args: &FilterArgs) -> Result<FilterSelection> {
    let base = match &args.selection {
        Some(path) => FilterSelection::load(path)?,
        None => FilterSelection::new(),
    };
    let date_range = DateRange::overlay(base.date_range, args.date_from, args.date_to)?;
    let overlay = FilterSelection {
        categories: filter::parse_selections(&args.selects)?,
        date_range,
        keep_missing: false,
    };
    let selection = base.merge(overlay);
    debug!(
        "Active selection over {} column(s), date range {}",
        selection.categories.len(),
        if selection.date_range.is_some() {
            "set"
        } else {
            "unset"
        }
    );
    Ok(selection)
}

/// Filters the prepared table, restarting the running sales total when asked.
pub(crate) fn current_view(
    prepared: &RecordTable,
    selection: &FilterSelection,
    args: &FilterArgs,
) -> RecordTable {
    let view = pipeline::view(prepared, selection);
    if args.recompute_cumulative {
        derive::recompute_cumulative_sales(view)
    } else {
        view
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn flags_override_selection_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.yaml");
        std::fs::write(
            &path,
            "categories:\n  Country: [Canada]\n  Segment: [Government]\n",
        )
        .unwrap();
        let args = FilterArgs {
            selects: vec!["Country=France".into()],
            date_from: NaiveDate::from_ymd_opt(2014, 1, 1),
            selection: Some(path),
            ..FilterArgs::default()
        };
        let selection = resolve_selection(&args).unwrap();
        assert_eq!(selection.categories["Country"], vec!["France"]);
        assert_eq!(selection.categories["Segment"], vec!["Government"]);
        let range = selection.date_range.unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2014, 1, 1).unwrap());
    }

    #[test]
    fn date_flag_keeps_the_other_bound_from_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.yaml");
        std::fs::write(
            &path,
            "date_range:\n  start: 2014-06-01\n  end: 2014-12-31\n",
        )
        .unwrap();
        let args = FilterArgs {
            date_to: NaiveDate::from_ymd_opt(2014, 9, 30),
            selection: Some(path.clone()),
            ..FilterArgs::default()
        };
        let range = resolve_selection(&args).unwrap().date_range.unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2014, 6, 1).unwrap());
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2014, 9, 30).unwrap());

        let inverted = FilterArgs {
            date_to: NaiveDate::from_ymd_opt(2014, 1, 31),
            selection: Some(path),
            ..FilterArgs::default()
        };
        assert!(resolve_selection(&inverted).is_err());
    }

    #[test]
    fn printable_delimiter_escapes_tabs() {
        assert_eq!(printable_delimiter(b'\t'), "\\t");
        assert_eq!(printable_delimiter(b';'), ";");
    }
}
