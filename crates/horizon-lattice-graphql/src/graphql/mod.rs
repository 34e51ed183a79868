//! GraphQL request descriptors and response envelopes.
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_graphql::graphql::{GraphQLRequest, strict_unwrap};
//!
//! let request = GraphQLRequest::build(
//!     "query GetUser($id: ID!) { user(id: $id) { id name } }",
//!     Some(serde_json::json!({ "id": "123" })),
//!     None,
//!     false,
//! );
//!
//! // GET form: ?op=GetUser&variables=...&extensions=...
//! let pairs = request.to_query_pairs()?;
//!
//! // POST form: {"query": "...", "variables": {...}, "extensions": {...}}
//! let body = request.to_body()?;
//!
//! // Strict access to a partially failed response
//! let data = strict_unwrap(&request.operation_name, envelope)?;
//! let name: String = data.get("user")?.get("name")?.deserialize()?;
//! ```

mod request;
mod response;
mod strict;

pub use request::{
    GraphQLRequest, PERSISTED_QUERY_EXTENSION, PERSISTED_QUERY_VERSION, PersistedQueryExtension,
};
pub use response::{
    ErrorExtensions, GqlResponse, GraphQLError, GraphQLLocation, PERSISTED_QUERY_NOT_FOUND,
    PathSegment, parse_response,
};
pub use strict::{StrictData, StrictField, strict_unwrap};
