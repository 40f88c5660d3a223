//! Import command handler for loading fragments into the database.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use velomix_lib::{read_fragment_imports, FragmentImport, SqliteStore};

use velomix_cli::output::{render_json, OutputFormat};

/// Handle the import subcommand.
///
/// Reads a JSON array of fragments from `source` (`-` for stdin) and upserts
/// them into the database at `database`, creating it when missing.
pub fn handle_import(database: &Path, source: &Path, format: OutputFormat) -> Result<()> {
    let fragments = read_source(source)?;
    let store = SqliteStore::open(database)
        .with_context(|| format!("failed to open database {}", database.display()))?;
    let summary = store
        .import_fragments(&fragments)
        .context("failed to import fragments")?;

    match format {
        OutputFormat::Json => print!("{}", render_json(&summary)?),
        _ => println!(
            "Imported {} fragments ({} skipped, {} points) into {}",
            summary.imported,
            summary.skipped,
            summary.points,
            database.display()
        ),
    }
    Ok(())
}

fn read_source(source: &Path) -> Result<Vec<FragmentImport>> {
    if source == Path::new("-") {
        return read_fragment_imports(io::stdin().lock())
            .context("failed to parse fragments from stdin");
    }
    let file = File::open(source)
        .with_context(|| format!("failed to open {}", source.display()))?;
    read_fragment_imports(BufReader::new(file))
        .with_context(|| format!("failed to parse fragments from {}", source.display()))
}
