// crates/core/src/error.rs
use thiserror::Error;

/// Errors that can occur while fetching a page from an upstream source
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ExtractError {
    pub fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// A source key that names no configured source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown source: {0}")]
pub struct UnknownSource(pub String);
