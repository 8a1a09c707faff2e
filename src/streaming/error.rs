//! Stream error taxonomy and outcomes.

use axum::http::StatusCode;
use thiserror::Error;

use crate::streaming::interval::IntervalError;
use crate::streaming::source::SourceError;

/// Failures of a stream session.
///
/// Only errors raised before the response head is committed reach the
/// client as a status code. Later ones abort the body.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The `interval` parameter is malformed.
    #[error(transparent)]
    InvalidInterval(#[from] IntervalError),

    /// The data source failed.
    #[error("{0}")]
    Read(#[source] SourceError),

    /// A record could not be serialized.
    #[error("{0}")]
    Encode(#[from] serde_json::Error),

    /// The producer went away without reporting an error.
    #[error("data source stopped unexpectedly")]
    ProducerStopped,
}

impl StreamError {
    /// HTTP status the error maps to while the head is still uncommitted.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInterval(_) => StatusCode::BAD_REQUEST,
            Self::Read(_) | Self::Encode(_) | Self::ProducerStopped => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// How a session that started streaming came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Server shutdown or request cancellation.
    Cancelled,
    /// The client went away (the response body was dropped).
    ClientGone,
    /// The data source failed after streaming began.
    ProducerFailed,
    /// A record failed to serialize after streaming began.
    EncodeFailed,
    /// The producer stopped without reporting an error.
    ProducerStopped,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::ClientGone => "client_gone",
            Self::ProducerFailed => "producer_failed",
            Self::EncodeFailed => "encode_failed",
            Self::ProducerStopped => "producer_stopped",
        }
    }

    /// Whether the outcome is a server-side fault.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ProducerFailed | Self::EncodeFailed | Self::ProducerStopped)
    }
}
