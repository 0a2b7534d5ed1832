use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Placeholder description for providers that do not report one.
pub const NOT_AVAILABLE: &str = "N/A";

/// Status reported when a fetch timed out or was cancelled.
pub const STATUS_TIMEOUT: u16 = 408;

/// Status reported for transport, decoding and other unexpected failures.
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Weather conditions reported by a provider, in metric units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub observed_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub humidity_pct: u8,
    pub visibility_m: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub status_code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success(Observation),
    Failure(Failure),
}

/// One provider's outcome for a single request.
///
/// The provider name is set on both branches so callers can always attribute
/// a result, even when the request never reached the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub provider: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl NormalizedResult {
    pub fn success(provider: impl Into<String>, observation: Observation) -> Self {
        Self {
            provider: provider.into(),
            outcome: Outcome::Success(observation),
        }
    }

    pub fn failure(provider: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            outcome: Outcome::Failure(Failure {
                status_code,
                message: message.into(),
            }),
        }
    }

    /// Build a failure from a fetch error, using the status the error maps to.
    pub fn from_error(provider: impl Into<String>, err: &FetchError) -> Self {
        Self::failure(provider, err.status_code(), err.message())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn observation(&self) -> Option<&Observation> {
        match &self.outcome {
            Outcome::Success(obs) => Some(obs),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure_details(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.failure_details().map(|f| f.status_code)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure_details().map(|f| f.message.as_str())
    }
}

/// Every outcome produced for one `fetch_all` call, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult {
    results: Vec<NormalizedResult>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, result: NormalizedResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedResult> {
        self.results.iter()
    }

    /// First result reported under `provider`. Position in the collection is
    /// not meaningful, so lookups go by name.
    pub fn find(&self, provider: &str) -> Option<&NormalizedResult> {
        self.results.iter().find(|r| r.provider == provider)
    }

    pub fn successes(&self) -> impl Iterator<Item = &NormalizedResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &NormalizedResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

impl IntoIterator for AggregateResult {
    type Item = NormalizedResult;
    type IntoIter = std::vec::IntoIter<NormalizedResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a AggregateResult {
    type Item = &'a NormalizedResult;
    type IntoIter = std::slice::Iter<'a, NormalizedResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl FromIterator<NormalizedResult> for AggregateResult {
    fn from_iter<I: IntoIterator<Item = NormalizedResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}
