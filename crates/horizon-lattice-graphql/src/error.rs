//! Error types for GraphQL dispatch.

use std::time::Duration;

use crate::graphql::GraphQLError;

/// Errors produced while dispatching a GraphQL operation.
///
/// Transport, status, parse and cancellation failures are always terminal:
/// the only retry this crate performs is the persisted-query fallback, which
/// is driven by a GraphQL-level sentinel and never by one of these errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The transport call itself failed.
    #[error("HTTP request error: {0}")]
    Transport(String),

    /// Connection refused, DNS failure or similar.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A response arrived but its status was outside the 2xx range.
    #[error("Response for {operation} errored: {status} {status_text}")]
    HttpStatus {
        /// Operation name of the failed call.
        operation: String,
        /// The HTTP status code.
        status: u16,
        /// The reason phrase for the status.
        status_text: String,
    },

    /// The response body was not valid JSON.
    #[error("Could not parse JSON from response for {operation}: {message}")]
    Parse {
        /// Operation name of the failed call.
        operation: String,
        /// Parser message.
        message: String,
    },

    /// The server answered with GraphQL errors.
    #[error("GraphQL errors{}: {}", for_operation(.operation), render_errors(.errors))]
    GraphQL {
        /// Operation name of the failed call.
        operation: String,
        /// The reported errors, in server order.
        errors: Vec<GraphQLError>,
    },

    /// A field read through a strict view was reported as failed.
    #[error("{message} (at {path})")]
    Field {
        /// Dotted path of the field.
        path: String,
        /// The error message the server attached to the field.
        message: String,
    },

    /// The caller's cancellation token fired.
    #[error("Request was cancelled")]
    Cancelled,

    /// The dispatch exceeded its timeout.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// JSON serialization error for variables or extensions.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The before-request hook failed.
    #[error("Before-request hook failed: {0}")]
    Hook(String),

    /// Configuration could not be read.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether this error came from a cancellation token or a timeout.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }

    /// The GraphQL errors carried by this failure, if any.
    pub fn graphql_errors(&self) -> &[GraphQLError] {
        match self {
            Self::GraphQL { errors, .. } => errors,
            _ => &[],
        }
    }
}

fn for_operation(operation: &str) -> String {
    if operation.is_empty() {
        String::new()
    } else {
        format!(" for {operation}")
    }
}

fn render_errors(errors: &[GraphQLError]) -> String {
    serde_json::to_string_pretty(errors).unwrap_or_else(|_| {
        errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    })
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("timed out: {err}"))
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<toml::de::Error> for FetchError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for FetchError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for FetchError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for GraphQL dispatch.
pub type Result<T> = std::result::Result<T, FetchError>;
