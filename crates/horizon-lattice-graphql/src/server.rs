//! Server-side dispatcher.
//!
//! Forwards cache directives to the transport and wraps every call in a
//! span. No user credentials are attached, since responses may be shared
//! between users through caches.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use serde_json::Value;
use url::Url;

use crate::config::{CreateDocumentId, FetcherConfig, RequestOptions, attached_document_id};
use crate::document::Document;
use crate::error::Result;
use crate::graphql::{GqlResponse, GraphQLRequest, StrictData, strict_unwrap};
use crate::headers::{header_map, normalize_headers};
use crate::negotiate::{Negotiator, Strategy, select_strategy};
use crate::trace::{NoopTracer, Tracer, TracingTracer};
use crate::transport::{CacheDirectives, ReqwestTransport, Transport};

const TARGET: &str = "horizon_lattice_graphql::server";

/// Builder for [`ServerFetcher`].
pub struct ServerFetcherBuilder {
    endpoint: String,
    transport: Option<Arc<dyn Transport>>,
    tracer: Arc<dyn Tracer>,
    persisted_queries: bool,
    dangerously_disable_cache: bool,
    default_timeout: Option<Duration>,
    default_headers: Vec<(String, String)>,
    include_query: bool,
    create_document_id: CreateDocumentId,
}

impl ServerFetcherBuilder {
    /// Create a builder for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: None,
            tracer: Arc::new(TracingTracer),
            persisted_queries: false,
            dangerously_disable_cache: false,
            default_timeout: None,
            default_headers: Vec::new(),
            include_query: false,
            create_document_id: attached_document_id(),
        }
    }

    /// Apply a loaded configuration.
    pub fn config(mut self, config: &FetcherConfig) -> Self {
        self.persisted_queries = config.persisted_queries;
        self.dangerously_disable_cache = config.dangerously_disable_cache;
        if let Some(timeout) = config.default_timeout() {
            self.default_timeout = Some(timeout);
        }
        self.default_headers.extend(
            config
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.include_query = config.include_query;
        self
    }

    /// Use a custom transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom tracer.
    pub fn tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// Do not open spans.
    pub fn no_tracing(self) -> Self {
        self.tracer(NoopTracer)
    }

    /// Probe queries with GET before posting them.
    pub fn persisted_queries(mut self, enabled: bool) -> Self {
        self.persisted_queries = enabled;
        self
    }

    /// Never cache and never use persisted queries.
    ///
    /// Meant for draft or preview content. Every call is posted with
    /// `no-store` and without a persisted query hash.
    pub fn dangerously_disable_cache(mut self, disable: bool) -> Self {
        self.dangerously_disable_cache = disable;
        self
    }

    /// Set the timeout for calls that bring no cancellation of their own.
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Add a header sent with every call.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Send the operation text even for pinned documents.
    pub fn include_query(mut self, include: bool) -> Self {
        self.include_query = include;
        self
    }

    /// Derive document ids with `create`.
    pub fn create_document_id<F>(mut self, create: F) -> Self
    where
        F: Fn(&Document) -> Option<String> + Send + Sync + 'static,
    {
        self.create_document_id = Arc::new(create);
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> Result<ServerFetcher> {
        let endpoint = Url::parse(&self.endpoint)?;
        let default_headers = header_map(self.default_headers)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(ServerFetcher {
            inner: Arc::new(ServerInner {
                endpoint,
                transport,
                tracer: self.tracer,
                persisted_queries: self.persisted_queries,
                dangerously_disable_cache: self.dangerously_disable_cache,
                default_timeout: self.default_timeout,
                default_headers,
                include_query: self.include_query,
                create_document_id: self.create_document_id,
            }),
        })
    }
}

struct ServerInner {
    endpoint: Url,
    transport: Arc<dyn Transport>,
    tracer: Arc<dyn Tracer>,
    persisted_queries: bool,
    dangerously_disable_cache: bool,
    default_timeout: Option<Duration>,
    default_headers: HeaderMap,
    include_query: bool,
    create_document_id: CreateDocumentId,
}

/// Dispatcher for server-rendered and cached content.
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_graphql::{CacheDirectives, Document, RequestOptions, ServerFetcher};
///
/// let fetcher = ServerFetcher::builder("https://shop.example/graphql")
///     .persisted_queries(true)
///     .build()?;
///
/// let products = Document::new("query products { products { id name } }");
/// let response = fetcher
///     .fetch(&products, None, CacheDirectives::revalidate(900), RequestOptions::new())
///     .await?;
/// ```
#[derive(Clone)]
pub struct ServerFetcher {
    inner: Arc<ServerInner>,
}

impl ServerFetcher {
    /// Create a builder for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> ServerFetcherBuilder {
        ServerFetcherBuilder::new(endpoint)
    }

    /// The endpoint every call goes to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Dispatch `document` and return the response envelope.
    ///
    /// `cache` is forwarded to the transport unchanged unless caching is
    /// disabled, in which case a derived `no-store` copy is sent instead.
    /// Per-call queue names are ignored.
    pub async fn fetch(
        &self,
        document: &Document,
        variables: Option<Value>,
        cache: CacheDirectives,
        options: impl Into<RequestOptions>,
    ) -> Result<GqlResponse> {
        let inner = &self.inner;
        let options = options.into();

        let document_id = (inner.create_document_id)(document);
        let request =
            GraphQLRequest::from_document(document, variables, document_id, inner.include_query);
        let headers = normalize_headers(&inner.default_headers, &options.headers);
        let cancellation = options.cancellation(inner.default_timeout);

        let (request, cache, strategy) = if inner.dangerously_disable_cache {
            tracing::debug!(
                target: TARGET,
                operation = %request.operation_name,
                "caching disabled"
            );
            (
                request.without_persisted_query(),
                cache.without_caching(),
                Strategy::ForcePost,
            )
        } else {
            let strategy = select_strategy(&request, inner.persisted_queries);
            (request, cache, strategy)
        };

        let mut span = inner.tracer.start_span(&request.operation_name);
        let result = Negotiator::new(
            inner.transport.as_ref(),
            &inner.endpoint,
            &headers,
            &cancellation,
        )
        .cache(Some(&cache))
        .execute(&request, strategy)
        .await;

        if let Err(err) = &result {
            span.record_error(&err.to_string());
        }
        span.end();

        result
    }

    /// Dispatch `document` and unwrap the envelope strictly.
    pub async fn fetch_strict(
        &self,
        document: &Document,
        variables: Option<Value>,
        cache: CacheDirectives,
        options: impl Into<RequestOptions>,
    ) -> Result<StrictData> {
        let envelope = self.fetch(document, variables, cache, options).await?;
        strict_unwrap(document.operation_name(), envelope)
    }
}

impl std::fmt::Debug for ServerFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerFetcher")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("persisted_queries", &self.inner.persisted_queries)
            .field("dangerously_disable_cache", &self.inner.dangerously_disable_cache)
            .field("default_timeout", &self.inner.default_timeout)
            .finish()
    }
}
