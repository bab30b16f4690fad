//! Full export command

use anyhow::{Context, Result};
use camino::Utf8Path;
use memprime_backup::export_full;

use crate::cli::ExportArgs;
use crate::output;

pub async fn run(args: ExportArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    output::header("Full Export");

    let config = super::load_config(config_path)?;
    let storage_root = super::resolve_root(args.root, &config)?;

    output::kv("Source", storage_root.as_str());
    output::kv("Output", args.output.as_str());
    println!();

    let spinner = output::spinner("Exporting...");
    let summary = export_full(storage_root.as_std_path(), args.output.as_std_path())
        .context("export failed")?;
    spinner.finish_and_clear();

    output::success("Export created");
    output::kv("Location", &summary.archive_path.display().to_string());
    output::kv("Entries", &summary.entry_count.to_string());
    output::kv("Size", &output::format_bytes(summary.size_bytes));
    Ok(())
}
