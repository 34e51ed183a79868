//! GraphQL request descriptors and their wire serializations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::document::{
    ANONYMOUS_OPERATION_NAME, Document, OperationType, classify_operation, compute_content_hash,
    extract_operation_name,
};
use crate::error::Result;

/// Key of the automatic persisted query marker inside `extensions`.
pub const PERSISTED_QUERY_EXTENSION: &str = "persistedQuery";

/// Version of the persisted query protocol this crate speaks.
pub const PERSISTED_QUERY_VERSION: u32 = 1;

/// The `extensions.persistedQuery` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueryExtension {
    /// Protocol version, always 1.
    pub version: u32,
    /// Lowercase hex SHA-256 of the operation text.
    pub sha256_hash: String,
}

impl PersistedQueryExtension {
    /// Marker for the given content hash.
    pub fn new(sha256_hash: impl Into<String>) -> Self {
        Self {
            version: PERSISTED_QUERY_VERSION,
            sha256_hash: sha256_hash.into(),
        }
    }
}

/// A single GraphQL call, ready to be serialized as GET or POST.
///
/// Created fresh per call by [`GraphQLRequest::build`] or
/// [`GraphQLRequest::from_document`]; the dispatchers never mutate one after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQLRequest {
    /// Operation name, never empty.
    pub operation_name: String,

    /// Operation text. Absent when a document id is set and the text is not
    /// forced with `include_query`.
    pub query: Option<String>,

    /// Allow-listed document identifier.
    pub document_id: Option<String>,

    /// Operation variables.
    pub variables: Option<Value>,

    /// Request extensions; carries the persisted query marker when the
    /// operation text is transmitted.
    pub extensions: Map<String, Value>,

    /// Send the operation text even when a document id is present.
    pub include_query: bool,

    operation_type: OperationType,
}

impl GraphQLRequest {
    /// Build a descriptor from raw operation text.
    ///
    /// The content hash is computed from `query` only when the text will
    /// actually be transmitted.
    pub fn build(
        query: &str,
        variables: Option<Value>,
        document_id: Option<String>,
        include_query: bool,
    ) -> Self {
        Self::assemble(query, None, variables, document_id, include_query)
    }

    /// Build a descriptor from a [`Document`], reusing its precomputed hash.
    pub fn from_document(
        document: &Document,
        variables: Option<Value>,
        document_id: Option<String>,
        include_query: bool,
    ) -> Self {
        Self::assemble(
            document.text(),
            document.precomputed_hash(),
            variables,
            document_id,
            include_query,
        )
    }

    fn assemble(
        query: &str,
        precomputed_hash: Option<&str>,
        variables: Option<Value>,
        document_id: Option<String>,
        include_query: bool,
    ) -> Self {
        let operation_name = extract_operation_name(query)
            .unwrap_or(ANONYMOUS_OPERATION_NAME)
            .to_string();
        // An empty id pins nothing.
        let document_id = document_id.filter(|id| !id.is_empty());
        let transmits_query = document_id.is_none() || include_query;

        let mut extensions = Map::new();
        if transmits_query {
            let hash = precomputed_hash
                .map(str::to_string)
                .unwrap_or_else(|| compute_content_hash(query));
            extensions.insert(
                PERSISTED_QUERY_EXTENSION.to_string(),
                persisted_query_value(hash),
            );
        }

        Self {
            operation_name,
            query: transmits_query.then(|| query.to_string()),
            document_id,
            variables,
            extensions,
            include_query,
            operation_type: classify_operation(query),
        }
    }

    /// Whether this call is pinned to an allow-listed document id.
    ///
    /// This is not the same as APQ eligibility, which also depends on the
    /// operation being a query.
    pub fn is_persisted_query(&self) -> bool {
        self.document_id.is_some()
    }

    /// Routing classification of the operation text.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Whether the operation text (and its hash) go on the wire.
    pub fn transmits_query(&self) -> bool {
        self.document_id.is_none() || self.include_query
    }

    /// The persisted query marker, if present.
    pub fn persisted_query(&self) -> Option<PersistedQueryExtension> {
        self.extensions
            .get(PERSISTED_QUERY_EXTENSION)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// A copy of this request with the persisted query marker removed.
    pub fn without_persisted_query(&self) -> Self {
        let mut request = self.clone();
        request.extensions.remove(PERSISTED_QUERY_EXTENSION);
        request
    }

    /// Ordered query-string pairs for the GET form.
    ///
    /// Always contains `op`. `variables` and `extensions` are JSON encoded and
    /// dropped when empty; `extensions` is also dropped whenever the POST body
    /// would omit the operation text, so both forms agree on what is sent.
    pub fn to_query_pairs(&self) -> Result<Vec<(&'static str, String)>> {
        let mut pairs = vec![("op", self.operation_name.clone())];
        if let Some(id) = self.document_id.as_deref().filter(|id| !id.is_empty()) {
            pairs.push(("documentId", id.to_string()));
        }
        if let Some(variables) = self.variables.as_ref().filter(|v| is_not_empty(v)) {
            pairs.push(("variables", serde_json::to_string(variables)?));
        }
        if !self.extensions.is_empty() && self.transmits_query() {
            pairs.push(("extensions", serde_json::to_string(&self.extensions)?));
        }
        Ok(pairs)
    }

    /// JSON body for the POST form.
    pub fn to_body(&self) -> Result<String> {
        let body = RequestBody {
            document_id: self.document_id.as_deref().filter(|id| !id.is_empty()),
            query: self
                .query
                .as_deref()
                .filter(|q| !q.is_empty() && self.transmits_query()),
            variables: self.variables.as_ref().filter(|v| is_not_empty(v)),
            extensions: Some(&self.extensions).filter(|e| !e.is_empty()),
        };
        Ok(serde_json::to_string(&body)?)
    }

    /// `endpoint?op=<name>&...` for the GET form.
    pub fn get_url(&self, endpoint: &Url) -> Result<Url> {
        let mut url = endpoint.clone();
        {
            let pairs = self.to_query_pairs()?;
            let mut query = url.query_pairs_mut();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// `endpoint?op=<name>` for the POST form.
    pub fn post_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("op", &self.operation_name);
        url
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<&'a Map<String, Value>>,
}

fn persisted_query_value(hash: String) -> Value {
    let mut marker = Map::new();
    marker.insert("version".into(), Value::from(PERSISTED_QUERY_VERSION));
    marker.insert("sha256Hash".into(), Value::String(hash));
    Value::Object(marker)
}

/// Empty objects, arrays and strings count as absent.
pub(crate) fn is_not_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
