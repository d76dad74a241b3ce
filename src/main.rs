//! Command-line front end for the nimbus weather core.
//!
//! Prints forecasts, geocoding results, and cache state as JSON.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use nimbus_core::Config;
use nimbus_weather::{Coordinates, ForecastError, ForecastOptions, ForecastService};

#[derive(Parser, Debug)]
#[command(name = "nimbus")]
#[command(about = "weather.gov forecasts with a persistent daily cache")]
struct Cli {
    /// Configuration file path (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forecast for coordinates or an address
    Forecast(ForecastArgs),

    /// Geocode an address or ZIP code
    Geocode {
        /// Free text or ZIP code
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// List previously forecast locations
    Locations,

    /// Purge cached data
    Purge {
        /// Only purge data for this location key (e.g. "Pittsburgh, PA")
        #[arg(long)]
        location: Option<String>,
    },

    /// Forget a location and its cached data
    Delete {
        /// Location key, e.g. "Pittsburgh, PA"
        key: String,
    },
}

#[derive(Args, Debug)]
struct ForecastArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true, requires = "lon", conflicts_with = "address")]
    lat: Option<String>,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<String>,

    /// Address or ZIP code to geocode first
    #[arg(long)]
    address: Option<String>,

    /// Skip the hourly forecast
    #[arg(long)]
    no_hourly: bool,

    /// Skip active alerts
    #[arg(long)]
    no_alerts: bool,

    /// Skip station observations
    #[arg(long)]
    no_observations: bool,
}

/// Log the detailed error and surface the user-facing message.
fn report(err: ForecastError) -> anyhow::Error {
    tracing::error!("{}", err);
    if err.is_retryable() {
        anyhow::anyhow!("{} This is usually temporary; try again shortly.", err.user_message())
    } else {
        anyhow::anyhow!(err.user_message())
    }
}

async fn forecast(service: &ForecastService, args: ForecastArgs) -> Result<()> {
    let (coords, mut options) = match (&args.address, &args.lat, &args.lon) {
        (Some(address), _, _) => {
            let geocoded = service.resolve_address(address).await.map_err(report)?;
            (
                Coordinates {
                    lat: geocoded.lat,
                    lon: geocoded.lon,
                },
                ForecastOptions::from_geocode(&geocoded),
            )
        }
        (None, Some(lat), Some(lon)) => (
            Coordinates::parse(lat, lon).map_err(|e| report(e.into()))?,
            ForecastOptions::default(),
        ),
        _ => bail!("Provide --lat and --lon, or --address"),
    };
    options.include_hourly = !args.no_hourly;
    options.include_alerts = !args.no_alerts;
    options.include_observations = !args.no_observations;

    let record = service
        .resolve_forecast(coords.lat, coords.lon, &options)
        .await
        .map_err(report)?;
    for degradation in [&record.hourly_error, &record.alerts_error].into_iter().flatten() {
        tracing::warn!("{:?}: {}", degradation.section, degradation.message);
    }
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    nimbus_core::init()?;

    let cli = Cli::parse();
    let (config, _validation) =
        Config::load_validated(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!("Using cache file {}", config.cache.file.display());

    let service = ForecastService::new(&config).map_err(report)?;

    match cli.command {
        Command::Forecast(args) => forecast(&service, args).await?,
        Command::Geocode { query } => {
            let result = service
                .resolve_address(&query.join(" "))
                .await
                .map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Locations => {
            let locations = service.list_known_locations().await;
            println!("{}", serde_json::to_string_pretty(&locations)?);
        }
        Command::Purge { location: Some(key) } => service.purge_location(&key).await,
        Command::Purge { location: None } => service.purge_all().await,
        Command::Delete { key } => service.delete_location(&key).await,
    }

    Ok(())
}
