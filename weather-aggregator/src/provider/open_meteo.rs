use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    http::{self, HttpTransport, ReqwestTransport},
    model::{NOT_AVAILABLE, NormalizedResult, Observation},
};

use super::WeatherClient;

pub const PROVIDER_NAME: &str = "OpenMeteo";

const BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

const HOURLY_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,apparent_temperature,surface_pressure,visibility";

/// Open-Meteo hourly forecast, reduced to the hour closest to now.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl OpenMeteoClient {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            transport,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build_request_url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}?latitude={latitude}&longitude={longitude}&hourly={HOURLY_FIELDS}&forecast_days=1",
            self.base_url
        )
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<f64>,
    #[serde(default)]
    relative_humidity_2m: Vec<u8>,
    #[serde(default)]
    surface_pressure: Vec<f64>,
    #[serde(default)]
    visibility: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    hourly: OmHourly,
}

#[async_trait]
impl WeatherClient for OpenMeteoClient {
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
        let url = self.build_request_url(latitude, longitude);

        match http::get_json::<OmResponse>(self.transport.as_ref(), &url, timeout, cancel).await {
            Ok(parsed) => {
                debug!(provider = PROVIDER_NAME, entries = parsed.hourly.time.len(), "decoded forecast");
                NormalizedResult::success(PROVIDER_NAME, normalize(&parsed.hourly, Utc::now()))
            }
            Err(err) => {
                warn!(provider = PROVIDER_NAME, status = err.status_code(), "request failed: {err}");
                NormalizedResult::from_error(PROVIDER_NAME, &err)
            }
        }
    }
}

fn normalize(hourly: &OmHourly, now: DateTime<Utc>) -> Observation {
    let (index, observed_at) = closest_entry(&hourly.time, now).unwrap_or((0, now));

    Observation {
        observed_at,
        temperature_c: hourly.temperature_2m.get(index).copied().unwrap_or_default(),
        pressure_hpa: hourly.surface_pressure.get(index).copied().unwrap_or_default(),
        humidity_pct: hourly.relative_humidity_2m.get(index).copied().unwrap_or_default(),
        visibility_m: hourly.visibility.get(index).copied().unwrap_or_default(),
        description: NOT_AVAILABLE.to_string(),
    }
}

/// Index and time of the entry nearest to `now`. Unparseable timestamps are
/// skipped; `None` when nothing parses.
fn closest_entry(times: &[String], now: DateTime<Utc>) -> Option<(usize, DateTime<Utc>)> {
    times
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| parse_time(raw).map(|t| (i, t)))
        .min_by_key(|(_, t)| (*t - now).abs())
}

/// Open-Meteo reports `2025-02-01T00:00` in the requested timezone (GMT by
/// default); full RFC 3339 is accepted too.
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
