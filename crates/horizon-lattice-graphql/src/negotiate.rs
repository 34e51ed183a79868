//! Automatic persisted query negotiation.
//!
//! One dispatch moves through these phases:
//!
//! ```text
//! Negotiate:  PROBE (GET) ── hit ──────────────────────────────> SUCCESS
//!                  └──── PersistedQueryNotFound ──> FALLBACK (POST) ──> SUCCESS | FAILURE
//! ForcePost:  FORCE_POST (POST) ─────────────────────────────────> SUCCESS | FAILURE
//! ```
//!
//! At most one GET and one POST are issued. Transport failures, non-2xx
//! statuses and unparseable bodies end the dispatch immediately, in either
//! phase; only the GraphQL-level `PersistedQueryNotFound` sentinel on an
//! unpinned request leads from PROBE to FALLBACK.

use std::fmt;

use http::HeaderMap;
use url::Url;

use crate::cancel::Cancellation;
use crate::document::OperationType;
use crate::error::Result;
use crate::graphql::{GqlResponse, GraphQLRequest, parse_response};
use crate::transport::{
    CacheDirectives, Credentials, HttpMethod, Transport, TransportRequest,
};

const TARGET: &str = "horizon_lattice_graphql::apq";

/// How a request is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Probe with GET, fall back to POST on a persisted query miss.
    Negotiate,
    /// POST only.
    ForcePost,
}

/// Pick the route for `request`.
///
/// Only queries are ever probed with GET, and only when persisted queries
/// are enabled or the request is pinned to a document id.
pub fn select_strategy(request: &GraphQLRequest, persisted_queries: bool) -> Strategy {
    let eligible = request.operation_type() == OperationType::Query
        && (persisted_queries || request.is_persisted_query());
    if eligible {
        Strategy::Negotiate
    } else {
        Strategy::ForcePost
    }
}

/// The network phase a transport call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// GET against the persisted query cache.
    Probe,
    /// POST after a cache miss.
    Fallback,
    /// POST without a prior probe.
    ForcePost,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe => write!(f, "PROBE"),
            Self::Fallback => write!(f, "FALLBACK"),
            Self::ForcePost => write!(f, "FORCE_POST"),
        }
    }
}

/// Runs the negotiation for one dispatch against a transport.
pub struct Negotiator<'a> {
    transport: &'a dyn Transport,
    endpoint: &'a Url,
    headers: &'a HeaderMap,
    credentials: Credentials,
    cache: Option<&'a CacheDirectives>,
    cancellation: &'a Cancellation,
}

impl<'a> Negotiator<'a> {
    /// A negotiator with default credentials and no cache directives.
    pub fn new(
        transport: &'a dyn Transport,
        endpoint: &'a Url,
        headers: &'a HeaderMap,
        cancellation: &'a Cancellation,
    ) -> Self {
        Self {
            transport,
            endpoint,
            headers,
            credentials: Credentials::default(),
            cache: None,
            cancellation,
        }
    }

    /// Set the credentials mode for every call.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Forward cache directives with every call.
    pub fn cache(mut self, cache: Option<&'a CacheDirectives>) -> Self {
        self.cache = cache;
        self
    }

    /// Dispatch `request` and return its envelope.
    ///
    /// GraphQL errors other than a repairable persisted query miss are
    /// returned inside the envelope, not as `Err`.
    pub async fn execute(
        &self,
        request: &GraphQLRequest,
        strategy: Strategy,
    ) -> Result<GqlResponse> {
        if strategy == Strategy::ForcePost {
            return self.post(request, Phase::ForcePost).await;
        }

        let response = self.probe(request).await?;
        if !response.has_persisted_query_error() {
            return Ok(response);
        }

        if request.is_persisted_query() {
            tracing::warn!(
                target: TARGET,
                operation = %request.operation_name,
                document_id = request.document_id.as_deref().unwrap_or_default(),
                "server does not know pinned document"
            );
            return Ok(response);
        }

        tracing::debug!(
            target: TARGET,
            operation = %request.operation_name,
            "persisted query not found"
        );
        self.post(request, Phase::Fallback).await
    }

    async fn probe(&self, request: &GraphQLRequest) -> Result<GqlResponse> {
        let url = request.get_url(self.endpoint)?;
        self.send(request, Phase::Probe, HttpMethod::Get, url, None).await
    }

    async fn post(&self, request: &GraphQLRequest, phase: Phase) -> Result<GqlResponse> {
        let url = request.post_url(self.endpoint);
        let body = request.to_body()?;
        self.send(request, phase, HttpMethod::Post, url, Some(body)).await
    }

    async fn send(
        &self,
        request: &GraphQLRequest,
        phase: Phase,
        method: HttpMethod,
        url: Url,
        body: Option<String>,
    ) -> Result<GqlResponse> {
        tracing::debug!(
            target: TARGET,
            operation = %request.operation_name,
            %phase,
            %method,
            "dispatching"
        );
        tracing::trace!(target: TARGET, %url, body = body.as_deref().unwrap_or_default());

        let transport_request = TransportRequest {
            method,
            url,
            headers: self.headers.clone(),
            body,
            credentials: self.credentials,
            cache: self.cache.cloned(),
        };

        let response = self
            .cancellation
            .run(self.transport.fetch(transport_request))
            .await
            .inspect_err(|err| {
                tracing::debug!(
                    target: TARGET,
                    operation = %request.operation_name,
                    %phase,
                    %err,
                    "transport failed"
                );
            })?;

        parse_response(&request.operation_name, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    use crate::error::FetchError;
    use crate::transport::TransportResponse;

    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<TransportResponse>>>,
        calls: Mutex<Vec<TransportRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<TransportResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::default(),
            }
        }

        fn methods(&self) -> Vec<HttpMethod> {
            self.calls.lock().iter().map(|c| c.method).collect()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.calls.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(TransportResponse::new(200, r#"{"data":{}}"#)))
        }
    }

    fn ok(body: serde_json::Value) -> Result<TransportResponse> {
        Ok(TransportResponse::new(200, body.to_string()))
    }

    fn not_found() -> Result<TransportResponse> {
        ok(json!({"errors": [{"message": "PersistedQueryNotFound"}]}))
    }

    async fn run(
        transport: &Scripted,
        request: &GraphQLRequest,
        strategy: Strategy,
    ) -> Result<GqlResponse> {
        let endpoint = Url::parse("https://localhost/graphql").unwrap();
        let headers = HeaderMap::new();
        let cancellation = Cancellation::none();
        Negotiator::new(transport, &endpoint, &headers, &cancellation)
            .execute(request, strategy)
            .await
    }

    #[test]
    fn test_strategy_selection() {
        let query = GraphQLRequest::build("query q { a }", None, None, false);
        let mutation = GraphQLRequest::build("mutation m { a }", None, None, false);
        let pinned = GraphQLRequest::build("query q { a }", None, Some("1".into()), false);
        let pinned_mutation =
            GraphQLRequest::build("mutation m { a }", None, Some("1".into()), false);

        assert_eq!(select_strategy(&query, true), Strategy::Negotiate);
        assert_eq!(select_strategy(&query, false), Strategy::ForcePost);
        assert_eq!(select_strategy(&mutation, true), Strategy::ForcePost);
        assert_eq!(select_strategy(&pinned, false), Strategy::Negotiate);
        assert_eq!(select_strategy(&pinned_mutation, true), Strategy::ForcePost);

        let shorthand = GraphQLRequest::build("{ a }", None, None, false);
        assert_eq!(select_strategy(&shorthand, true), Strategy::ForcePost);
    }

    #[tokio::test]
    async fn test_probe_hit_issues_single_get() {
        let transport = Scripted::new(vec![ok(json!({"data": {"a": 1}}))]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);

        let response = run(&transport, &request, Strategy::Negotiate).await.unwrap();

        assert_eq!(response.data, Some(json!({"a": 1})));
        assert_eq!(transport.methods(), vec![HttpMethod::Get]);
        assert!(transport.calls.lock()[0].body.is_none());
    }

    #[tokio::test]
    async fn test_miss_falls_back_to_post_once() {
        let transport = Scripted::new(vec![not_found(), ok(json!({"data": {"a": 1}}))]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);

        let response = run(&transport, &request, Strategy::Negotiate).await.unwrap();

        assert!(response.is_success());
        assert_eq!(transport.methods(), vec![HttpMethod::Get, HttpMethod::Post]);
        let body = transport.calls.lock()[1].body.clone().unwrap();
        assert!(body.contains("\"query\":\"query q { a }\""));
        assert!(body.contains("sha256Hash"));
    }

    #[tokio::test]
    async fn test_fallback_miss_is_not_retried() {
        let transport = Scripted::new(vec![not_found(), not_found()]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);

        let response = run(&transport, &request, Strategy::Negotiate).await.unwrap();

        assert!(response.has_persisted_query_error());
        assert_eq!(transport.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_pinned_miss_is_surfaced() {
        let transport = Scripted::new(vec![not_found()]);
        let request = GraphQLRequest::build("query q { a }", None, Some("doc".into()), false);

        let response = run(&transport, &request, Strategy::Negotiate).await.unwrap();

        assert!(response.has_persisted_query_error());
        assert_eq!(transport.methods(), vec![HttpMethod::Get]);
    }

    #[tokio::test]
    async fn test_probe_http_failure_is_terminal() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(500, "oops"))]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);

        let err = run(&transport, &request, Strategy::Negotiate).await.unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
        assert_eq!(transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_transport_failure_is_terminal() {
        let transport = Scripted::new(vec![Err(FetchError::Connection("refused".into()))]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);

        let err = run(&transport, &request, Strategy::Negotiate).await.unwrap_err();

        assert!(matches!(err, FetchError::Connection(_)));
        assert_eq!(transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_parse_failure_is_terminal() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(200, "not json"))]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);

        let err = run(&transport, &request, Strategy::Negotiate).await.unwrap_err();

        assert!(matches!(err, FetchError::Parse { .. }));
        assert_eq!(transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_force_post() {
        let transport = Scripted::new(vec![ok(json!({"data": {"a": 1}}))]);
        let request = GraphQLRequest::build("mutation m { a }", None, None, false);

        run(&transport, &request, Strategy::ForcePost).await.unwrap();

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, HttpMethod::Post);
        assert_eq!(calls[0].url.as_str(), "https://localhost/graphql?op=m");
    }

    #[tokio::test]
    async fn test_cancelled_probe_skips_fallback() {
        let transport = Scripted::new(vec![not_found()]);
        let request = GraphQLRequest::build("query q { a }", None, None, false);
        let endpoint = Url::parse("https://localhost/graphql").unwrap();
        let headers = HeaderMap::new();
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let cancellation = Cancellation::token(token);

        let err = Negotiator::new(&transport, &endpoint, &headers, &cancellation)
            .execute(&request, Strategy::Negotiate)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
        assert!(transport.calls.lock().len() <= 1);
        assert!(transport.methods().iter().all(|m| *m == HttpMethod::Get));
    }
}
