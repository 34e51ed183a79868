//! Operation documents and the text utilities the dispatchers rely on.
//!
//! Everything here works on the operation *text*: the content hash used for
//! automatic persisted queries, the operation name sent as `?op=`, and the
//! keyword heuristic that decides whether an operation may be sent as GET.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Name used for anonymous operations.
pub const ANONYMOUS_OPERATION_NAME: &str = "(GraphQL)";

static OPERATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(query|mutation)\s+(\w+)").expect("operation name pattern is valid")
});

/// The kind of operation as far as request routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A read-only operation that may be sent as GET.
    Query,
    /// Anything else; always sent as POST.
    Mutation,
}

impl OperationType {
    /// Lowercase keyword for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 over the UTF-8 bytes of `text`, lowercase hex.
///
/// This is the unsalted digest GraphQL servers compute for automatic
/// persisted queries, so a hash produced here is accepted by a server that
/// hashes the same text independently.
pub fn compute_content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Extract the operation name from `query|mutation <Name>`.
///
/// Returns `None` for anonymous documents.
pub fn extract_operation_name(text: &str) -> Option<&str> {
    OPERATION_NAME
        .captures(text)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Classify an operation by its leading keyword.
///
/// Only text that starts with the literal `query` keyword (after trimming)
/// counts as a query. The shorthand form `{ field }` is therefore classified
/// as a mutation and will never be sent as GET.
pub fn classify_operation(text: &str) -> OperationType {
    if text.trim().starts_with("query") {
        OperationType::Query
    } else {
        OperationType::Mutation
    }
}

/// Something that can render itself as GraphQL operation text.
///
/// Implement this for parsed ASTs; pre-stringified documents go through
/// [`Document::new`] directly.
pub trait PrintDocument {
    /// Produce canonical operation text.
    fn print(&self) -> String;
}

/// A GraphQL operation document.
///
/// Holds the operation text plus two optional pieces of metadata: a
/// precomputed content hash and an externally assigned document identifier
/// used for allow-listing. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    hash: Option<String>,
    document_id: Option<String>,
}

impl Document {
    /// Create a document from operation text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hash: None,
            document_id: None,
        }
    }

    /// Create a document by printing a parsed operation.
    pub fn from_printed(document: &impl PrintDocument) -> Self {
        Self::new(document.print())
    }

    /// Attach a precomputed content hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Attach an allow-listed document identifier.
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// The operation text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The precomputed hash, if one was attached.
    pub fn precomputed_hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// The content hash: the precomputed one, or SHA-256 of the text.
    pub fn content_hash(&self) -> String {
        match &self.hash {
            Some(hash) => hash.clone(),
            None => compute_content_hash(&self.text),
        }
    }

    /// The attached document identifier.
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    /// The operation name, or [`ANONYMOUS_OPERATION_NAME`].
    pub fn operation_name(&self) -> &str {
        extract_operation_name(&self.text).unwrap_or(ANONYMOUS_OPERATION_NAME)
    }

    /// The routing classification of this document.
    pub fn operation_type(&self) -> OperationType {
        classify_operation(&self.text)
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
