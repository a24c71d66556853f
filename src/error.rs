//! Error handling for the Shamah client

use std::fmt;
use thiserror::Error;

/// Unified error type for the Shamah client
#[derive(Error, Debug)]
pub enum Error {
    /// Login rejected by the server, or the login request could not be sent
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The access token could not be decoded
    #[error("Token decode error: {0}")]
    TokenDecode(String),

    /// An authenticated call was made without a session
    #[error("Missing session")]
    MissingSession,

    /// The API answered with a non-success status
    #[error("Request failed with status {status}: {message}")]
    Fetch {
        /// HTTP status code
        status: u16,
        /// Response body, or the `detail` field when the body is JSON
        message: String,
    },

    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Durable session storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new token decode error
    pub fn token_decode<T: fmt::Display>(msg: T) -> Self {
        Error::TokenDecode(msg.to_string())
    }

    /// Returns the HTTP status if the server rejected the request
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Fetch { status, .. } => Some(*status),
            Error::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
