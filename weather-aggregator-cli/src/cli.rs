use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::Password;
use tracing::{info, warn};
use weather_aggregator::{Aggregator, CancellationToken, Config, ProviderId};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-agg", version, about = "Query several weather providers at once")]
pub struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweathermap".
        provider: String,
    },

    /// Show current weather at a coordinate from every configured provider.
    Show {
        /// Latitude in degrees, -90..=90.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in degrees, -180..=180.
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Per-provider timeout in seconds; defaults to the configured value.
        #[arg(long, allow_negative_numbers = true)]
        timeout: Option<f64>,

        /// Print results as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List known providers and whether they are ready to use.
    Providers,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show {
                lat,
                lon,
                timeout,
                json,
            } => show(lat, lon, timeout, json).await,
            Command::Providers => providers(),
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    if !id.requires_api_key() {
        println!("{} needs no configuration.", id.display_name());
        return Ok(());
    }

    let mut config = Config::load()?;
    let api_key = Password::new(&format!("API key for {}:", id.display_name()))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!("Saved API key for {} to {}", id.display_name(), Config::config_file_path()?.display());
    Ok(())
}

async fn show(lat: f64, lon: f64, timeout: Option<f64>, json: bool) -> anyhow::Result<()> {
    validate_coordinates(lat, lon)?;

    let config = Config::load()?;
    let timeout = resolve_timeout(timeout, &config);
    let aggregator = Aggregator::from_config(&config);

    let cancel = CancellationToken::new();
    let on_ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, cancelling requests");
                cancel.cancel();
            }
        })
    };

    let results = aggregator.fetch_all(lat, lon, timeout, cancel).await;
    on_ctrl_c.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", output::render(&results));
    }

    Ok(())
}

fn providers() -> anyhow::Result<()> {
    let config = Config::load()?;

    for id in ProviderId::all() {
        let status = if config.is_provider_configured(*id) {
            "ready"
        } else {
            "missing API key"
        };
        println!("{:<16} {:<16} {status}", id.as_str(), id.display_name());
    }

    Ok(())
}

fn validate_coordinates(lat: f64, lon: f64) -> anyhow::Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        bail!("Latitude must be between -90 and 90 degrees, got {lat}.");
    }
    if !(-180.0..=180.0).contains(&lon) {
        bail!("Longitude must be between -180 and 180 degrees, got {lon}.");
    }
    Ok(())
}

fn resolve_timeout(requested: Option<f64>, config: &Config) -> Duration {
    match requested.map(Duration::try_from_secs_f64) {
        Some(Ok(timeout)) => timeout,
        Some(Err(_)) => {
            warn!("timeout must be a non-negative number of seconds, using the configured one");
            config.timeout()
        }
        None => config.timeout(),
    }
}
