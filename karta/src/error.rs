//! Error types used by the crate.

use karta_wkb::error::WkbError;
use thiserror::Error;

/// Karta error type.
#[derive(Debug, Clone, Error)]
pub enum KartaError {
    /// I/O error (connection failure, broken response body).
    #[error("failed to load data")]
    IO,
    /// Server responded with a non-success status.
    #[error("request to {url} failed with status {status}")]
    Network {
        /// Requested url.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// Tile payload is malformed. The tile cannot be rendered.
    #[error("failed to decode data: {0}")]
    Decoding(#[from] WkbError),
    /// Tile was removed before its rendering finished.
    #[error("rendering was cancelled")]
    Cancelled,
    /// Style document is invalid.
    #[error("invalid style: {0}")]
    Style(String),
    /// Item not found.
    #[error("item not found")]
    NotFound,
    /// Image decoding error.
    #[error("image decode error: {0}")]
    ImageDecode(String),
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
}

impl KartaError {
    /// True for the cancellation outcome, which is never reported to the host.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KartaError::Cancelled)
    }
}

impl From<reqwest::Error> for KartaError {
    fn from(_value: reqwest::Error) -> Self {
        Self::IO
    }
}

impl From<image::ImageError> for KartaError {
    fn from(value: image::ImageError) -> Self {
        Self::ImageDecode(value.to_string())
    }
}
