use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::FetchError,
    http::{self, HttpTransport, ReqwestTransport},
    model::{NOT_AVAILABLE, NormalizedResult, Observation},
};

use super::WeatherClient;

pub const PROVIDER_NAME: &str = "OpenWeatherMap";

const BASE_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";

/// OpenWeatherMap One Call API, current conditions only.
#[derive(Debug, Clone)]
pub struct OpenWeatherMapClient {
    api_key: String,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl OpenWeatherMapClient {
    pub fn new(api_key: String) -> Self {
        Self::with_transport(api_key, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(api_key: String, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            transport,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One Call URL for the coordinate. The API key is query-encoded.
    pub fn build_request_url(&self, latitude: f64, longitude: f64) -> Result<String, FetchError> {
        let mut url = Url::parse(&format!(
            "{}?lat={latitude}&lon={longitude}&exclude=minutely,alerts,daily,hourly&units=metric",
            self.base_url
        ))
        .map_err(|e| FetchError::Transport(format!("invalid OpenWeatherMap URL: {e}")))?;

        url.query_pairs_mut().append_pair("appid", &self.api_key);
        Ok(url.into())
    }

    async fn fetch_current(
        &self,
        latitude: f64,
        longitude: f64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<OwmCurrent, FetchError> {
        let url = self.build_request_url(latitude, longitude)?;
        let parsed: OwmResponse =
            http::get_json(self.transport.as_ref(), &url, timeout, cancel).await?;
        Ok(parsed.current)
    }
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    dt: i64,
    temp: f64,
    pressure: f64,
    humidity: u8,
    #[serde(default)]
    visibility: f64,
    #[serde(default)]
    weather: Option<Vec<OwmWeather>>,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    current: OwmCurrent,
}

#[async_trait]
impl WeatherClient for OpenWeatherMapClient {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> NormalizedResult {
        match self.fetch_current(latitude, longitude, timeout, cancel).await {
            Ok(current) => {
                debug!(provider = PROVIDER_NAME, dt = current.dt, "decoded current conditions");
                NormalizedResult::success(PROVIDER_NAME, normalize(current))
            }
            Err(err) => {
                warn!(provider = PROVIDER_NAME, status = err.status_code(), "request failed: {err}");
                NormalizedResult::from_error(PROVIDER_NAME, &err)
            }
        }
    }
}

fn normalize(current: OwmCurrent) -> Observation {
    let description = current
        .weather
        .and_then(|list| list.into_iter().next())
        .map(|w| w.description)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Observation {
        observed_at: unix_to_utc(current.dt).unwrap_or_else(Utc::now),
        temperature_c: current.temp,
        pressure_hpa: current.pressure,
        humidity_pct: current.humidity,
        visibility_m: current.visibility,
        description,
    }
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}
