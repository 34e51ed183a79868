//! GraphQL request dispatch for Horizon Lattice.
//!
//! This crate executes queries and mutations against a single GraphQL
//! endpoint:
//!
//! - **Automatic persisted queries**: queries are probed with a GET carrying
//!   only their SHA-256 hash and re-sent as a POST when the server reports
//!   `PersistedQueryNotFound`
//! - **Response envelopes**: `{ data, errors }` is returned as is, with a
//!   strict adapter that fails lazily on fields named by an error path
//! - **Client dispatcher**: credentials, a default timeout, a before-request
//!   hook and named FIFO queues
//! - **Server dispatcher**: cache directives, a cache-disabling mode for
//!   draft content and one span per call
//!
//! # Client
//!
//! ```ignore
//! use horizon_lattice_graphql::{ClientFetcher, Document, RequestOptions};
//!
//! let fetcher = ClientFetcher::builder("https://shop.example/graphql")
//!     .persisted_queries(true)
//!     .before_request(|| async { refresh_session().await })
//!     .build()?;
//!
//! let add = Document::new("mutation addToCart($id: ID!) { addToCart(id: $id) { id } }");
//!
//! // Calls sharing a queue name run one at a time, in call order.
//! let cart = || RequestOptions::new().queue("cart");
//! let first = fetcher.fetch(&add, Some(json!({ "id": "1" })), cart());
//! let second = fetcher.fetch(&add, Some(json!({ "id": "2" })), cart());
//! let (first, second) = tokio::join!(first, second);
//! ```
//!
//! # Server
//!
//! ```ignore
//! use horizon_lattice_graphql::{CacheDirectives, Document, RequestOptions, ServerFetcher};
//!
//! let fetcher = ServerFetcher::builder("https://cms.example/graphql")
//!     .config(&FetcherConfig::from_toml_str(&config_text)?)
//!     .build()?;
//!
//! let page = Document::new("query page($slug: String!) { page(slug: $slug) { title body } }");
//! let data = fetcher
//!     .fetch_strict(
//!         &page,
//!         Some(json!({ "slug": "home" })),
//!         CacheDirectives::revalidate(900),
//!         RequestOptions::new(),
//!     )
//!     .await?;
//! let title: String = data.get("page")?.get("title")?.deserialize()?;
//! ```
//!
//! # Cancellation
//!
//! Every call accepts either [`RequestOptions`] or a bare
//! `tokio_util::sync::CancellationToken`. One token and one deadline cover
//! both the probe and the fallback of a call; a cancelled probe is never
//! followed by a fallback.

mod cancel;
mod client;
mod config;
mod document;
mod error;
pub mod graphql;
mod headers;
mod negotiate;
mod queue;
mod server;
mod trace;
pub mod transport;

pub use cancel::Cancellation;
pub use client::{BeforeRequestHook, ClientFetcher, ClientFetcherBuilder, DEFAULT_CLIENT_TIMEOUT};
pub use config::{CreateDocumentId, FetcherConfig, RequestOptions, attached_document_id};
pub use document::{
    ANONYMOUS_OPERATION_NAME, Document, OperationType, PrintDocument, classify_operation,
    compute_content_hash, extract_operation_name,
};
pub use error::{FetchError, Result};
pub use headers::{JSON_CONTENT_TYPE, header_map, normalize_headers};
pub use negotiate::{Negotiator, Phase, Strategy, select_strategy};
pub use queue::{QueueRegistry, QueueTicket};
pub use server::{ServerFetcher, ServerFetcherBuilder};
pub use trace::{NoopTracer, Span, Tracer, TracingTracer};

// Re-export commonly used types at the crate root
pub use graphql::{
    GqlResponse, GraphQLError, GraphQLRequest, PathSegment, StrictData, StrictField,
    parse_response, strict_unwrap,
};
pub use transport::{
    CacheDirectives, CacheMode, Credentials, HttpMethod, ReqwestTransport, Revalidate, Transport,
    TransportRequest, TransportResponse,
};
pub use tokio_util::sync::CancellationToken;
