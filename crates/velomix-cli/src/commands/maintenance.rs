//! Database housekeeping and statistics command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use velomix_lib::SqliteStore;

use velomix_cli::output::{render_json, OutputFormat};

/// Rows removed by a prune run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PruneSummary {
    pub fragments: usize,
    pub geo: usize,
}

fn open(database: &Path) -> Result<SqliteStore> {
    SqliteStore::open_existing(database)
        .with_context(|| format!("failed to open database {}", database.display()))
}

/// Handle the prune subcommand.
///
/// Deletes routes and activities stored without geometry, then geo-points
/// nothing references any longer.
pub fn handle_prune(database: &Path, format: OutputFormat) -> Result<()> {
    let store = open(database)?;
    let summary = PruneSummary {
        fragments: store
            .delete_empty_fragments()
            .context("failed to delete empty fragments")?,
        geo: store
            .prune_orphan_geo()
            .context("failed to prune orphan geo-points")?,
    };

    match format {
        OutputFormat::Json => print!("{}", render_json(&summary)?),
        _ => println!(
            "Removed {} empty fragments and {} orphan geo-points",
            summary.fragments, summary.geo
        ),
    }
    Ok(())
}

/// Handle the stats subcommand.
pub fn handle_stats(database: &Path, format: OutputFormat) -> Result<()> {
    let stats = open(database)?
        .stats()
        .context("failed to count stored rows")?;

    match format {
        OutputFormat::Json => print!("{}", render_json(&stats)?),
        _ => {
            println!("Database:  {}", database.display());
            println!("Fragments: {}", stats.fragments);
            println!("Geo:       {}", stats.geo);
            println!("Routes:    {}", stats.routes);
        }
    }
    Ok(())
}
