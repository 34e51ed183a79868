//! Client-side dispatcher.
//!
//! Sends cookies with every call, applies a default timeout, runs an
//! optional hook before touching the network and can serialize calls
//! through named queues.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::cancel::Cancellation;
use crate::config::{CreateDocumentId, FetcherConfig, RequestOptions, attached_document_id};
use crate::document::Document;
use crate::error::Result;
use crate::graphql::{GqlResponse, GraphQLRequest, StrictData, strict_unwrap};
use crate::headers::normalize_headers;
use crate::negotiate::{Negotiator, select_strategy};
use crate::queue::QueueRegistry;
use crate::transport::{Credentials, ReqwestTransport, Transport};

const TARGET: &str = "horizon_lattice_graphql::client";

/// Timeout used when neither the builder nor the call sets one.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Hook awaited once per call before the first network request.
pub type BeforeRequestHook = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Builder for [`ClientFetcher`].
pub struct ClientFetcherBuilder {
    endpoint: String,
    transport: Option<Arc<dyn Transport>>,
    persisted_queries: bool,
    default_timeout: Option<Duration>,
    default_headers: Vec<(String, String)>,
    include_query: bool,
    create_document_id: CreateDocumentId,
    before_request: Option<BeforeRequestHook>,
    queues: Option<QueueRegistry>,
}

impl ClientFetcherBuilder {
    /// Create a builder for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: None,
            persisted_queries: false,
            default_timeout: Some(DEFAULT_CLIENT_TIMEOUT),
            default_headers: Vec::new(),
            include_query: false,
            create_document_id: attached_document_id(),
            before_request: None,
            queues: None,
        }
    }

    /// Apply a loaded configuration.
    ///
    /// `dangerously_disable_cache` has no meaning on the client and is
    /// ignored.
    pub fn config(mut self, config: &FetcherConfig) -> Self {
        self.persisted_queries = config.persisted_queries;
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

    /// Probe queries with GET before posting them.
    pub fn persisted_queries(mut self, enabled: bool) -> Self {
        self.persisted_queries = enabled;
        self
    }

    /// Set the timeout for calls that bring no cancellation of their own.
    ///
    /// `None` disables the default timeout.
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

    /// Await `hook` before every call.
    pub fn before_request<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.before_request = Some(Arc::new(move || hook().boxed()));
        self
    }

    /// Share queues with another dispatcher.
    pub fn queues(mut self, queues: QueueRegistry) -> Self {
        self.queues = Some(queues);
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> Result<ClientFetcher> {
        let endpoint = Url::parse(&self.endpoint)?;
        let default_headers = crate::headers::header_map(self.default_headers)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(ClientFetcher {
            inner: Arc::new(ClientInner {
                endpoint,
                transport,
                persisted_queries: self.persisted_queries,
                default_timeout: self.default_timeout,
                default_headers,
                include_query: self.include_query,
                create_document_id: self.create_document_id,
                before_request: self.before_request,
                queues: self.queues.unwrap_or_default(),
            }),
        })
    }
}

struct ClientInner {
    endpoint: Url,
    transport: Arc<dyn Transport>,
    persisted_queries: bool,
    default_timeout: Option<Duration>,
    default_headers: HeaderMap,
    include_query: bool,
    create_document_id: CreateDocumentId,
    before_request: Option<BeforeRequestHook>,
    queues: QueueRegistry,
}

impl ClientInner {
    async fn dispatch(
        &self,
        request: GraphQLRequest,
        headers: HeaderMap,
        cancellation: Cancellation,
    ) -> Result<GqlResponse> {
        if let Some(hook) = &self.before_request {
            cancellation.run(hook()).await?;
        }

        let strategy = select_strategy(&request, self.persisted_queries);
        tracing::debug!(
            target: TARGET,
            operation = %request.operation_name,
            ?strategy,
            "dispatching"
        );

        Negotiator::new(
            self.transport.as_ref(),
            &self.endpoint,
            &headers,
            &cancellation,
        )
        .credentials(Credentials::Include)
        .execute(&request, strategy)
        .await
    }
}

/// Dispatcher for code acting on behalf of a signed-in user.
///
/// Every call includes credentials, so the transport's cookie jar is used.
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_graphql::{ClientFetcher, Document, RequestOptions};
///
/// let fetcher = ClientFetcher::builder("https://shop.example/graphql")
///     .persisted_queries(true)
///     .build()?;
///
/// let cart = Document::new("query cart { cart { id lines { id } } }");
/// let response = fetcher
///     .fetch(&cart, None, RequestOptions::new().queue("cart"))
///     .await?;
/// ```
#[derive(Clone)]
pub struct ClientFetcher {
    inner: Arc<ClientInner>,
}

impl ClientFetcher {
    /// Create a builder for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> ClientFetcherBuilder {
        ClientFetcherBuilder::new(endpoint)
    }

    /// The endpoint every call goes to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// The queues this dispatcher serializes calls through.
    pub fn queues(&self) -> &QueueRegistry {
        &self.inner.queues
    }

    /// Dispatch `document` and return the response envelope.
    ///
    /// GraphQL errors stay inside the envelope. When `options` names a
    /// queue, the call takes its place in that queue here, before the
    /// returned future is first polled.
    pub fn fetch(
        &self,
        document: &Document,
        variables: Option<Value>,
        options: impl Into<RequestOptions>,
    ) -> impl Future<Output = Result<GqlResponse>> + Send + 'static {
        let options = options.into();
        let inner = Arc::clone(&self.inner);

        let document_id = (inner.create_document_id)(document);
        let request =
            GraphQLRequest::from_document(document, variables, document_id, inner.include_query);
        let headers = normalize_headers(&inner.default_headers, &options.headers);
        let cancellation = options.cancellation(inner.default_timeout);
        let ticket = options
            .queue_name
            .as_deref()
            .map(|name| inner.queues.enqueue(name));

        async move {
            let job = inner.dispatch(request, headers, cancellation.clone());
            match ticket {
                // Waiting in the queue counts against the same deadline.
                Some(ticket) => cancellation.run(ticket.run(job)).await,
                None => job.await,
            }
        }
    }

    /// Dispatch `document` and unwrap the envelope strictly.
    pub fn fetch_strict(
        &self,
        document: &Document,
        variables: Option<Value>,
        options: impl Into<RequestOptions>,
    ) -> impl Future<Output = Result<StrictData>> + Send + 'static {
        let operation = document.operation_name().to_string();
        let response = self.fetch(document, variables, options);
        async move { strict_unwrap(&operation, response.await?) }
    }

    /// Dispatch `document` and deserialize its data.
    ///
    /// Any GraphQL error fails the call, including a partial result.
    pub fn fetch_data<T: DeserializeOwned>(
        &self,
        document: &Document,
        variables: Option<Value>,
        options: impl Into<RequestOptions>,
    ) -> impl Future<Output = Result<T>> + Send + 'static {
        let operation = document.operation_name().to_string();
        let response = self.fetch(document, variables, options);
        async move { response.await?.into_result(&operation)?.data_as() }
    }
}

impl std::fmt::Debug for ClientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFetcher")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("persisted_queries", &self.inner.persisted_queries)
            .field("default_timeout", &self.inner.default_timeout)
            .field("queues", &self.inner.queues)
            .finish()
    }
}
