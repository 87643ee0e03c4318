use catalink::errors::LinkError;
use thiserror::Error;

/// Errors raised while talking to the catalog's REST API.
#[derive(Error, Debug)]
pub enum AtlanError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No data found for the request")]
    NotFound,
}

impl AtlanError {
    /// Transport failures, throttling and server-side errors may succeed on a
    /// second attempt; client errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            AtlanError::Request(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            AtlanError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<AtlanError> for LinkError {
    fn from(err: AtlanError) -> Self {
        LinkError::Catalog(err.to_string())
    }
}

/// Result type for catalog API operations
pub type Result<T> = std::result::Result<T, AtlanError>;
