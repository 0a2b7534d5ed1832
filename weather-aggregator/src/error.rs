use std::time::Duration;

use thiserror::Error;

use crate::model::{STATUS_INTERNAL_ERROR, STATUS_TIMEOUT};

/// Message reported when the caller's cancellation token fires mid-request.
pub const CANCELLED_MESSAGE: &str = "request was cancelled";

/// Everything that can go wrong while fetching from a single provider.
///
/// These never escape a weather client; they are folded into a failed
/// `NormalizedResult` via [`FetchError::status_code`] and [`FetchError::message`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure; the message is the full cause chain.
    #[error("{0}")]
    Transport(String),

    /// Non-2xx response. The body is kept verbatim.
    #[error("{body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("{}", CANCELLED_MESSAGE)]
    Cancelled,

    #[error("{0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Status { status, .. } => *status,
            FetchError::Timeout(_) | FetchError::Cancelled => STATUS_TIMEOUT,
            FetchError::Transport(_) | FetchError::Decode(_) => STATUS_INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("invalid client: {0}")]
    InvalidClient(String),
}
