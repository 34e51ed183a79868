//! GraphQL response envelopes.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{FetchError, Result};
use crate::transport::TransportResponse;

/// Error message a server uses to report an unknown persisted query hash.
pub const PERSISTED_QUERY_NOT_FOUND: &str = "PersistedQueryNotFound";

/// Metadata attached to a GraphQL error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorExtensions {
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Service that produced the error, for federated gateways.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Any other fields the server sent.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

impl GraphQLError {
    /// An error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Set the error path.
    pub fn with_path(mut self, path: impl IntoIterator<Item = PathSegment>) -> Self {
        self.path = Some(path.into_iter().collect());
        self
    }

    /// The `extensions.code` value, if present.
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.code.as_deref()
    }

    /// Whether this is the persisted query cache-miss sentinel.
    ///
    /// Exact, case-sensitive comparison of the message.
    pub fn is_persisted_query_not_found(&self) -> bool {
        self.message == PERSISTED_QUERY_NOT_FOUND
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at {})", render_path(path))?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphQLError {}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

pub(crate) fn render_path(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        if i > 0 && matches!(segment, PathSegment::Field(_)) {
            out.push('.');
        }
        out.push_str(&segment.to_string());
    }
    out
}

/// The `{ data, errors }` envelope of a GraphQL-over-HTTP response.
///
/// A 2xx response is not necessarily a successful operation: `errors` may be
/// populated alongside `data` or instead of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GqlResponse<T = Value> {
    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<T>,

    /// Errors that occurred during execution.
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

impl<T> GqlResponse<T> {
    /// A data-only envelope.
    pub fn from_data(data: T) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// All reported errors, empty when there are none.
    pub fn errors(&self) -> &[GraphQLError] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Check if the response contains errors.
    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Check if the response was successful (has data and no errors).
    pub fn is_success(&self) -> bool {
        self.data.is_some() && !self.has_errors()
    }

    /// Whether any error is the persisted query cache-miss sentinel.
    pub fn has_persisted_query_error(&self) -> bool {
        self.errors()
            .iter()
            .any(GraphQLError::is_persisted_query_not_found)
    }

    /// Get all errors as a combined message.
    pub fn error_message(&self) -> Option<String> {
        if !self.has_errors() {
            return None;
        }
        Some(
            self.errors()
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Fail on any GraphQL error, otherwise return the envelope unchanged.
    pub fn into_result(self, operation: &str) -> Result<Self> {
        match self.errors {
            Some(errors) if !errors.is_empty() => Err(FetchError::GraphQL {
                operation: operation.to_string(),
                errors,
            }),
            errors => Ok(Self {
                data: self.data,
                errors,
            }),
        }
    }
}

impl GqlResponse<Value> {
    /// Deserialize `data` into a concrete type.
    ///
    /// Fails if the response has errors or no data.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(errors) = self.errors.as_ref().filter(|e| !e.is_empty()) {
            return Err(FetchError::GraphQL {
                operation: String::new(),
                errors: errors.clone(),
            });
        }

        match &self.data {
            Some(data) => serde_json::from_value(data.clone()).map_err(|e| {
                FetchError::Json(format!("Failed to deserialize GraphQL response: {e}"))
            }),
            None => Err(FetchError::Json("No data in GraphQL response".into())),
        }
    }

    /// Deserialize one top-level field of `data`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // For a response like: { "data": { "user": { "id": "1", "name": "John" } } }
    /// let user: User = response.field("user")?;
    /// ```
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        if let Some(errors) = self.errors.as_ref().filter(|e| !e.is_empty()) {
            return Err(FetchError::GraphQL {
                operation: String::new(),
                errors: errors.clone(),
            });
        }

        match &self.data {
            Some(Value::Object(data)) => {
                let value = data.get(field).ok_or_else(|| {
                    FetchError::Json(format!("Field '{field}' not found in response"))
                })?;
                serde_json::from_value(value.clone()).map_err(|e| {
                    FetchError::Json(format!("Failed to deserialize field '{field}': {e}"))
                })
            }
            Some(_) => Err(FetchError::Json("Response data is not an object".into())),
            None => Err(FetchError::Json("No data in GraphQL response".into())),
        }
    }
}

/// Validate a transport response and parse its envelope.
///
/// Non-2xx statuses and bodies that are not JSON are hard failures. GraphQL
/// errors inside a well-formed envelope are returned to the caller untouched.
pub fn parse_response(operation: &str, response: &TransportResponse) -> Result<GqlResponse> {
    if !response.ok() {
        return Err(FetchError::HttpStatus {
            operation: operation.to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
        });
    }

    serde_json::from_slice(&response.body).map_err(|e| FetchError::Parse {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}
