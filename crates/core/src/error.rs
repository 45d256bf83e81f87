//! Error taxonomy for catalog requests.

use thiserror::Error;

/// Failure modes of a catalog request.
///
/// The type is `Clone` so the last failure can be kept on a query entry and
/// handed out in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The transport could not reach the host (DNS, connect, timeout, ...).
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-2xx status.
    #[error("server responded with HTTP {status}")]
    Http {
        /// Raw HTTP status code.
        status: u16,
    },
    /// A single-item lookup answered 404.
    #[error("resource not found")]
    NotFound,
    /// The body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Whether the fetch layer may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { .. })
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Convenience alias used across the request and query layers.
pub type CatalogResult<T> = Result<T, CatalogError>;
