//! HTTP seam shared by the provider clients.
//!
//! Providers talk to the network only through [`HttpTransport`], so tests can
//! swap in a canned transport without touching the mapping code.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    /// Issue a GET and return status plus body, whatever the status is.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let res = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = res.status().as_u16();
        let body = res.text().await.map_err(|e| map_reqwest_error(e, timeout))?;

        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        // The URL can carry credentials, and the OS-level cause sits in the source chain.
        FetchError::Transport(format!("{:#}", anyhow::Error::new(err.without_url())))
    }
}

/// GET `url` and decode a 2xx body as JSON.
///
/// The whole exchange is bounded by `timeout` and aborted as soon as `cancel`
/// fires; whichever happens first decides the error.
pub async fn get_json<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    url: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, FetchError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        res = tokio::time::timeout(timeout, transport.get(url, timeout)) => {
            res.map_err(|_| FetchError::Timeout(timeout))??
        }
    };

    if !response.is_success() {
        return Err(FetchError::Status {
            status: response.status,
            body: response.body,
        });
    }

    Ok(serde_json::from_str(&response.body)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Transport that answers every request with the same canned response,
    /// optionally after a delay.
    #[derive(Debug, Clone)]
    pub struct FakeTransport {
        response: Result<HttpResponse, String>,
        delay: Duration,
    }

    impl FakeTransport {
        pub fn ok(body: &str) -> Self {
            Self::with_status(200, body)
        }

        pub fn with_status(status: u16, body: &str) -> Self {
            Self {
                response: Ok(HttpResponse::new(status, body)),
                delay: Duration::ZERO,
            }
        }

        pub fn unreachable(cause: &str) -> Self {
            Self {
                response: Err(cause.to_string()),
                delay: Duration::ZERO,
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, FetchError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.clone().map_err(FetchError::Transport)
        }
    }
}
