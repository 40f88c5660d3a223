use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use velomix_cli::logging::{init_logging, LoggingConfig};
use velomix_cli::output::{print_footer, OutputFormat};
use velomix_cli::terminal::ColorPalette;
use velomix_lib::{resolve_database_path, GeoPoint, Preference};

mod commands;

use commands::generate::{handle_generate, GenerateArgs};
use commands::import::handle_import;
use commands::maintenance::{handle_prune, handle_stats};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cycling route synthesis from stored fragments")]
struct Cli {
    /// Path to the fragment database.
    #[arg(long, global = true, env = "VELOMIX_DATABASE")]
    database: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the elapsed time after the command finishes.
    #[arg(long, global = true)]
    timing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import fragments from a JSON file (`-` reads stdin).
    Import {
        /// JSON array of routes, segments, and activities.
        file: PathBuf,
    },
    /// Generate routes of the requested length.
    Generate {
        /// Start latitude.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Start longitude.
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// End latitude; defaults to the start.
        #[arg(long, requires = "end_lng", allow_negative_numbers = true)]
        end_lat: Option<f64>,
        /// End longitude; defaults to the start.
        #[arg(long, requires = "end_lat", allow_negative_numbers = true)]
        end_lng: Option<f64>,
        /// Requested distance in kilometres.
        #[arg(long = "distance-km")]
        distance_km: f64,
        /// Route ordering: discover, distance, or familiar.
        #[arg(long, default_value = "familiar")]
        preference: String,
        /// Difficulty label recorded with the request.
        #[arg(long, default_value = "advanced")]
        difficulty: String,
        /// Rider whose activities feed the familiar track.
        #[arg(long)]
        user: Option<String>,
        /// Seed for the search jitter.
        #[arg(long)]
        seed: Option<u64>,
        /// Do not store the generated routes.
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete empty fragments and orphan geo-points.
    Prune,
    /// Show row counts of the database.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingConfig::from_env().verbose(cli.verbose));
    let started = Instant::now();

    let database = resolve_database_path(cli.database.as_deref())
        .context("failed to resolve the database location")?;

    match cli.command {
        Command::Import { file } => handle_import(&database, &file, cli.format)?,
        Command::Generate {
            lat,
            lng,
            end_lat,
            end_lng,
            distance_km,
            preference,
            difficulty,
            user,
            seed,
            dry_run,
        } => {
            let args = GenerateArgs {
                lat,
                lng,
                end: end_lat
                    .zip(end_lng)
                    .map(|(lat, lng)| GeoPoint::new(lat, lng)),
                distance_km,
                preference: preference.parse::<Preference>().unwrap_or_default(),
                difficulty,
                user,
                seed,
                dry_run,
            };
            handle_generate(&database, &args, cli.format).await?;
        }
        Command::Prune => handle_prune(&database, cli.format)?,
        Command::Stats => handle_stats(&database, cli.format)?,
    }

    if cli.timing {
        print_footer(started.elapsed(), &ColorPalette::detect());
    }
    Ok(())
}
