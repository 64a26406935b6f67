use anyhow::Result;
use log::info;

use crate::{
    cli::{OutputFormat, PreviewArgs},
    io_utils, table,
};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let prepared = crate::load_prepared(&args.source)?;
    let selection = crate::resolve_selection(&args.filters)?;
    let view = crate::current_view(&prepared, &selection, &args.filters);

    if let Some(path) = &args.output {
        let delimiter = io_utils::resolve_output_delimiter(Some(path), None, b',');
        return io_utils::write_table(path, &view, delimiter);
    }

    let head = view.head(args.rows);
    match args.format {
        OutputFormat::Table => print!("{}", table::render_record_table(&head)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&head)?),
    }
    info!(
        "Displayed {} of {} matching row(s) from {:?}",
        head.row_count(),
        view.row_count(),
        args.source.input
    );
    Ok(())
}
