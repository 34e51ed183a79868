//! Strict access to partially successful responses.
//!
//! [`strict_unwrap`] turns an envelope into a [`StrictData`] view. Reading a
//! field whose path was reported in `errors` fails at the moment of the
//! read, so a consumer only pays for the fields it actually touches.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::response::{GqlResponse, GraphQLError, PathSegment, render_path};
use crate::error::{FetchError, Result};

static NULL: Value = Value::Null;

/// Unwrap an envelope for strict consumers.
///
/// Fails with every reported error when there is no data at all. With data
/// present, field errors are deferred to [`StrictField::get`].
pub fn strict_unwrap(operation: &str, envelope: GqlResponse) -> Result<StrictData> {
    let errors = envelope.errors.unwrap_or_default();
    match envelope.data {
        Some(data) if !data.is_null() => Ok(StrictData { data, errors }),
        _ if !errors.is_empty() => Err(FetchError::GraphQL {
            operation: operation.to_string(),
            errors,
        }),
        _ => Ok(StrictData {
            data: Value::Null,
            errors,
        }),
    }
}

/// Response data with its field errors attached.
#[derive(Debug, Clone, PartialEq)]
pub struct StrictData {
    data: Value,
    errors: Vec<GraphQLError>,
}

impl StrictData {
    /// View of the whole data tree.
    pub fn root(&self) -> StrictField<'_> {
        StrictField {
            value: &self.data,
            path: Vec::new(),
            errors: &self.errors,
        }
    }

    /// Read a top-level field.
    pub fn get(&self, segment: impl Into<PathSegment>) -> Result<StrictField<'_>> {
        self.root().get(segment)
    }

    /// Read and deserialize a top-level field.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.get(name)?.deserialize()
    }

    /// Errors reported alongside the data.
    pub fn errors(&self) -> &[GraphQLError] {
        &self.errors
    }

    /// The raw data, ignoring any errors.
    pub fn into_value(self) -> Value {
        self.data
    }
}

/// A position inside [`StrictData`].
#[derive(Debug, Clone)]
pub struct StrictField<'a> {
    value: &'a Value,
    path: Vec<PathSegment>,
    errors: &'a [GraphQLError],
}

impl<'a> StrictField<'a> {
    /// Step into an object field or array element.
    ///
    /// Fails with the server's message when an error was reported at exactly
    /// this path. Missing fields read as `null`.
    pub fn get(&self, segment: impl Into<PathSegment>) -> Result<StrictField<'a>> {
        let segment = segment.into();
        let mut path = self.path.clone();
        path.push(segment.clone());

        if let Some(error) = self
            .errors
            .iter()
            .find(|e| e.path.as_deref() == Some(path.as_slice()))
        {
            return Err(FetchError::Field {
                path: render_path(&path),
                message: error.message.clone(),
            });
        }

        let value = match (&segment, self.value) {
            (PathSegment::Field(name), Value::Object(map)) => map.get(name).unwrap_or(&NULL),
            (PathSegment::Index(idx), Value::Array(items)) => items.get(*idx).unwrap_or(&NULL),
            _ => &NULL,
        };

        Ok(StrictField {
            value,
            path,
            errors: self.errors,
        })
    }

    /// The raw value at this position.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Path of this position.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Deserialize this subtree.
    ///
    /// Fails if any error was reported at or below this position, since
    /// deserializing reads every field underneath it.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let nested = self.errors.iter().find(|e| {
            e.path
                .as_deref()
                .is_some_and(|p| p.len() > self.path.len() && p.starts_with(&self.path))
        });
        if let Some(error) = nested {
            let path = error.path.as_deref().unwrap_or_default();
            return Err(FetchError::Field {
                path: render_path(path),
                message: error.message.clone(),
            });
        }

        serde_json::from_value(self.value.clone()).map_err(|e| {
            FetchError::Json(format!(
                "Failed to deserialize '{}': {e}",
                render_path(&self.path)
            ))
        })
    }
}
