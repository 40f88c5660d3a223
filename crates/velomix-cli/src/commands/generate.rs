//! Generate command handler for synthesising routes from stored fragments.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use velomix_lib::{
    DirectionsClient, DirectionsConfig, GenerationQuery, GeoPoint, Preference, RouteGenerator,
    SpatialIndex, SqliteStore,
};

use velomix_cli::output::{render_report, OutputFormat};
use velomix_cli::terminal::ColorPalette;

/// Arguments for the generate command.
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub lat: f64,
    pub lng: f64,
    /// Destination; defaults to the start for a round trip.
    pub end: Option<GeoPoint>,
    /// Requested length in kilometres.
    pub distance_km: f64,
    pub preference: Preference,
    pub difficulty: String,
    pub user: Option<String>,
    pub seed: Option<u64>,
    /// Skip persisting the generated routes.
    pub dry_run: bool,
}

impl GenerateArgs {
    /// Convert CLI args to a library query.
    pub fn to_query(&self) -> GenerationQuery {
        let start = GeoPoint::new(self.lat, self.lng);
        let mut query = GenerationQuery::round_trip(start, self.distance_km * 1000.0)
            .with_end(self.end.unwrap_or(start))
            .with_preference(self.preference)
            .with_difficulty(self.difficulty.clone());
        if let Some(user) = &self.user {
            query = query.with_user(user.clone());
        }
        query
    }
}

/// Handle the generate subcommand.
///
/// Loads the spatial index from the database, runs the pipeline against the
/// configured directions service, and prints the resulting report.
pub async fn handle_generate(
    database: &Path,
    args: &GenerateArgs,
    format: OutputFormat,
) -> Result<()> {
    let query = args.to_query();
    query.validate().context("invalid generation request")?;

    let store = Arc::new(
        SqliteStore::open_existing(database)
            .with_context(|| format!("failed to open database {}", database.display()))?,
    );
    let geos = store.load_geo().context("failed to load geo-points")?;
    let index = SpatialIndex::build(geos);
    debug!(points = index.len(), "spatial index ready");

    let directions = DirectionsClient::new(DirectionsConfig::from_env())
        .context("failed to create directions client")?;

    let mut generator = RouteGenerator::new(store.clone(), Arc::new(index), Arc::new(directions));
    if !args.dry_run {
        generator = generator.with_repository(store);
    }
    if let Some(seed) = args.seed {
        generator = generator.with_seed(seed);
    }

    let report = generator
        .generate(query)
        .await
        .context("route generation failed")?;

    print!(
        "{}",
        render_report(&report, format, &ColorPalette::detect())?
    );
    Ok(())
}
