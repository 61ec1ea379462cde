//! Error types for the chat client.

use thiserror::Error;

/// Failure of a single chat exchange.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response (DNS, connection, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status and no usable JSON body.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body, truncated.
        body: String,
    },

    /// The server answered successfully but the body was not JSON.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL could not be turned into a chat endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
