//! Dispatcher configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cancel::Cancellation;
use crate::document::Document;
use crate::error::{FetchError, Result};
use crate::headers::header_map;

/// Derives the allow-listed document id sent for a document.
pub type CreateDocumentId = Arc<dyn Fn(&Document) -> Option<String> + Send + Sync>;

/// The default [`CreateDocumentId`]: the id attached to the document, if any.
pub fn attached_document_id() -> CreateDocumentId {
    Arc::new(|document: &Document| document.document_id().map(str::to_string))
}

/// Options shared by the client and server dispatchers.
///
/// Every field is optional in serialized form:
///
/// ```toml
/// apq = true
/// default_timeout_ms = 10000
/// include_query = false
///
/// [default_headers]
/// x-client-name = "storefront"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Probe queries with GET before posting them.
    #[serde(alias = "apq")]
    pub persisted_queries: bool,

    /// Timeout applied when a call brings no cancellation of its own.
    ///
    /// When unset the client uses 30 seconds and the server none.
    pub default_timeout_ms: Option<u64>,

    /// Headers sent with every call.
    pub default_headers: BTreeMap<String, String>,

    /// Send the operation text even for pinned documents.
    pub include_query: bool,

    /// Never cache and never use persisted queries. Server only.
    pub dangerously_disable_cache: bool,
}

impl FetcherConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// The default timeout, if configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// The default headers as a validated header map.
    pub fn header_map(&self) -> Result<HeaderMap> {
        header_map(self.default_headers.iter())
    }
}

/// Per-call options.
///
/// A bare [`CancellationToken`] converts into options carrying only that
/// token, so dispatch methods accept either.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Caller-owned cancellation.
    pub cancel: Option<CancellationToken>,
    /// Timeout for this call. Applies in addition to `cancel`.
    pub timeout: Option<Duration>,
    /// Headers merged over the dispatcher defaults.
    pub headers: HeaderMap,
    /// Serialize this call behind earlier calls with the same name.
    pub queue_name: Option<String>,
}

impl RequestOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the call when `token` fires.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Time the call out after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add one header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        self.headers.extend(header_map([(name, value)])?);
        Ok(self)
    }

    /// Merge a header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Run the call in the named queue.
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queue_name = Some(name.into());
        self
    }

    /// Resolve the cancellation for this call.
    ///
    /// `default_timeout` only applies when the caller supplied neither a
    /// token nor a timeout.
    pub(crate) fn cancellation(&self, default_timeout: Option<Duration>) -> Cancellation {
        let timeout = match (&self.cancel, self.timeout) {
            (_, Some(timeout)) => Some(timeout),
            (None, None) => default_timeout,
            (Some(_), None) => None,
        };
        Cancellation::new(self.cancel.clone(), timeout)
    }
}

impl From<CancellationToken> for RequestOptions {
    fn from(token: CancellationToken) -> Self {
        Self::new().cancel(token)
    }
}
