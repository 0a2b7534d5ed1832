use crate::{
    Config, NormalizedResult,
    provider::{open_meteo::OpenMeteoClient, openweathermap::OpenWeatherMapClient},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub mod open_meteo;
pub mod openweathermap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenMeteo,
    OpenWeatherMap,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "openmeteo",
            ProviderId::OpenWeatherMap => "openweathermap",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenMeteo, ProviderId::OpenWeatherMap]
    }

    /// Name the provider's client tags its results with.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => open_meteo::PROVIDER_NAME,
            ProviderId::OpenWeatherMap => openweathermap::PROVIDER_NAME,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::OpenWeatherMap)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openmeteo" | "open_meteo" | "open-meteo" => Ok(ProviderId::OpenMeteo),
            "openweathermap" | "openweather" | "open_weather_map" | "owm" => {
                Ok(ProviderId::OpenWeatherMap)
            }
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openmeteo, openweathermap."
            )),
        }
    }
}

/// A single weather provider, able to fetch current conditions for a
/// coordinate and normalize them.
///
/// `fetch` never fails: transport errors, bad statuses, undecodable payloads,
/// timeouts and cancellation all come back as a failed [`NormalizedResult`]
/// tagged with [`WeatherClient::provider_name`]. Implementations must give up
/// once `timeout` elapses or `cancel` fires, whichever is first.
#[async_trait]
pub trait WeatherClient: Send + Sync + Debug {
    fn provider_name(&self) -> &str;

    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> NormalizedResult;
}

/// Construct a client for one provider from config.
pub fn client_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn WeatherClient>> {
    let client: Arc<dyn WeatherClient> = match id {
        ProviderId::OpenMeteo => Arc::new(OpenMeteoClient::new()),
        ProviderId::OpenWeatherMap => {
            let api_key = config.provider_api_key(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured for provider '{id}'.\n\
                     Hint: run `weather-agg configure {id}` and enter your API key."
                )
            })?;
            Arc::new(OpenWeatherMapClient::new(api_key.to_owned()))
        }
    };

    Ok(client)
}

/// Every client that can be built from config.
///
/// Providers that need an API key are skipped, with a warning, when none is
/// configured.
pub fn default_clients(config: &Config) -> Vec<Arc<dyn WeatherClient>> {
    ProviderId::all()
        .iter()
        .filter_map(|&id| match client_from_config(id, config) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(provider = %id, "{id} is skipped: {err}");
                None
            }
        })
        .collect()
}
