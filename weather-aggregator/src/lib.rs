//! Core library for the `weather-agg` CLI.
//!
//! This crate defines:
//! - The [`Aggregator`], which queries every registered provider concurrently
//!   and returns one result per provider, successful or not
//! - The [`WeatherClient`] contract and the built-in providers
//! - Shared domain models (normalized results, aggregates)
//! - Configuration & credentials handling
//!
//! It is used by `weather-aggregator-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod provider;

pub use aggregator::Aggregator;
pub use config::{Config, ProviderConfig};
pub use error::{AggregatorError, FetchError};
pub use model::{AggregateResult, Failure, NormalizedResult, Observation, Outcome};
pub use provider::{ProviderId, WeatherClient};
pub use tokio_util::sync::CancellationToken;
