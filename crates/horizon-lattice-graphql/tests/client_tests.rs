//! Integration tests for the client dispatcher.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{EchoTransport, MockTransport, Reply};
use horizon_lattice_graphql::{
    CancellationToken, ClientFetcher, Document, FetchError, HttpMethod, RequestOptions,
    compute_content_hash,
};
use serde_json::json;

const ENDPOINT: &str = "https://shop.example/graphql";

fn client(transport: MockTransport, apq: bool) -> ClientFetcher {
    ClientFetcher::builder(ENDPOINT)
        .transport(transport)
        .persisted_queries(apq)
        .build()
        .expect("Failed to build client")
}

fn query_params(transport: &MockTransport, index: usize) -> HashMap<String, String> {
    transport.calls()[index]
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[tokio::test]
async fn test_plain_call_is_single_post() {
    let transport = MockTransport::new().reply(Reply::data(json!({"foo": "bar"})));
    let fetcher = client(transport.clone(), false);

    let response = fetcher
        .fetch(
            &Document::new("query myQuery { foo }"),
            Some(json!({"myVar": "baz"})),
            RequestOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.data, Some(json!({"foo": "bar"})));
    assert_eq!(transport.methods(), vec![HttpMethod::Post]);
    assert_eq!(
        transport.calls()[0].url.as_str(),
        "https://shop.example/graphql?op=myQuery"
    );

    let body = transport.body(0);
    assert_eq!(body["query"], "query myQuery { foo }");
    assert_eq!(body["variables"], json!({"myVar": "baz"}));
}

#[tokio::test]
async fn test_persisted_query_hit_is_single_get() {
    let transport = MockTransport::new().reply(Reply::data(json!({"foo": "bar"})));
    let fetcher = client(transport.clone(), true);
    let text = "query myQuery { foo }";

    fetcher
        .fetch(&Document::new(text), Some(json!({"myVar": "baz"})), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(transport.methods(), vec![HttpMethod::Get]);
    assert!(transport.calls()[0].body.is_none());

    let params = query_params(&transport, 0);
    assert_eq!(params["op"], "myQuery");
    assert_eq!(params["variables"], r#"{"myVar":"baz"}"#);
    assert!(!params.contains_key("query"));
    let extensions: serde_json::Value = serde_json::from_str(&params["extensions"]).unwrap();
    assert_eq!(
        extensions["persistedQuery"]["sha256Hash"],
        compute_content_hash(text)
    );
}

#[tokio::test]
async fn test_persisted_query_miss_falls_back_to_post() {
    let transport = MockTransport::new()
        .reply(Reply::not_found())
        .reply(Reply::data(json!({"foo": "bar"})));
    let fetcher = client(transport.clone(), true);
    let text = "\n\tquery myQuery {\n\t\tfoo\n\t\tbar\n\t}\n";

    let response = fetcher
        .fetch(&Document::new(text), None, RequestOptions::new())
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(transport.methods(), vec![HttpMethod::Get, HttpMethod::Post]);

    let body = transport.body(1);
    assert_eq!(body["query"], text);
    assert_eq!(
        body["extensions"]["persistedQuery"]["sha256Hash"],
        "e5276e0694f661ef818210402d06d249625ef169a1c2b60383acb2c42d45f7ae"
    );
    assert_eq!(body["extensions"]["persistedQuery"]["version"], 1);
}

#[tokio::test]
async fn test_mutation_never_probes() {
    for apq in [false, true] {
        let transport = MockTransport::new().reply(Reply::data(json!({"ok": true})));
        let fetcher = client(transport.clone(), apq);

        fetcher
            .fetch(
                &Document::new("mutation addToCart { addToCart { id } }"),
                None,
                RequestOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(transport.methods(), vec![HttpMethod::Post]);
    }
}

#[tokio::test]
async fn test_anonymous_query_is_posted() {
    let transport = MockTransport::new().reply(Reply::data(json!({"foo": 1})));
    let fetcher = client(transport.clone(), true);

    fetcher
        .fetch(&Document::new("{ foo }"), None, RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(transport.methods(), vec![HttpMethod::Post]);
    assert_eq!(
        transport.calls()[0].url.as_str(),
        "https://shop.example/graphql?op=%28GraphQL%29"
    );
}

#[tokio::test]
async fn test_http_failure_never_falls_back() {
    let transport = MockTransport::new().reply(Reply::Raw(503, "unavailable"));
    let fetcher = client(transport.clone(), true);

    let err = fetcher
        .fetch(&Document::new("query q { foo }"), None, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
    assert_eq!(
        err.to_string(),
        "Response for q errored: 503 Service Unavailable"
    );
    assert_eq!(transport.methods(), vec![HttpMethod::Get]);
}

#[tokio::test]
async fn test_connection_failure_never_falls_back() {
    let transport =
        MockTransport::new().reply(Reply::Fail(FetchError::Connection("refused".into())));
    let fetcher = client(transport.clone(), true);

    let err = fetcher
        .fetch(&Document::new("query q { foo }"), None, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Connection(_)));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_malformed_probe_is_not_a_miss() {
    let transport = MockTransport::new().reply(Reply::Raw(200, "<html>"));
    let fetcher = client(transport.clone(), true);

    let err = fetcher
        .fetch(&Document::new("query q { foo }"), None, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse { .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_pinned_document_probes_without_text() {
    let transport = MockTransport::new().reply(Reply::data(json!({"foo": 1})));
    let fetcher = client(transport.clone(), false);
    let document = Document::new("query hello { foo }").with_document_id("123");

    fetcher
        .fetch(&document, Some(json!({"name": "world"})), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(transport.methods(), vec![HttpMethod::Get]);
    let params = query_params(&transport, 0);
    assert_eq!(params.len(), 3);
    assert_eq!(params["op"], "hello");
    assert_eq!(params["documentId"], "123");
    assert_eq!(params["variables"], r#"{"name":"world"}"#);
}

#[tokio::test]
async fn test_pinned_miss_is_not_repaired() {
    let transport = MockTransport::new()
        .reply(Reply::not_found())
        .reply(Reply::not_found());
    let fetcher = client(transport.clone(), true);
    let document = Document::new("query hello { foo }").with_document_id("123");

    let response = fetcher
        .fetch(&document, None, RequestOptions::new())
        .await
        .unwrap();
    assert!(response.has_persisted_query_error());
    assert_eq!(transport.calls().len(), 1);

    let err = fetcher
        .fetch_data::<serde_json::Value>(&document, None, RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.graphql_errors()[0].message, "PersistedQueryNotFound");
    assert_eq!(transport.methods(), vec![HttpMethod::Get, HttpMethod::Get]);
}

#[tokio::test]
async fn test_custom_document_ids() {
    let transport = MockTransport::new()
        .reply(Reply::not_found())
        .reply(Reply::data(json!({"foo": 1})));
    let fetcher = ClientFetcher::builder(ENDPOINT)
        .transport(transport.clone())
        .include_query(true)
        .create_document_id(|document| Some(format!("app:{}", document.operation_name())))
        .build()
        .unwrap();

    fetcher
        .fetch(&Document::new("query hello { foo }"), None, RequestOptions::new())
        .await
        .unwrap();

    let params = query_params(&transport, 0);
    assert_eq!(params["documentId"], "app:hello");
    assert!(params.contains_key("extensions"));
    // Pinned, so the miss is surfaced rather than repaired.
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_empty_document_id_is_ignored() {
    let text = "query hello { foo }";
    let transport = MockTransport::new()
        .reply(Reply::data(json!({"foo": 1})))
        .reply(Reply::not_found())
        .reply(Reply::data(json!({"foo": 2})));
    let plain = ClientFetcher::builder(ENDPOINT)
        .transport(transport.clone())
        .create_document_id(|_| Some(String::new()))
        .build()
        .unwrap();

    plain
        .fetch(&Document::new(text), None, RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(transport.methods(), vec![HttpMethod::Post]);
    let body = transport.body(0);
    assert_eq!(body["query"], text);
    assert_eq!(
        body["extensions"]["persistedQuery"]["sha256Hash"],
        compute_content_hash(text)
    );
    assert!(body.get("documentId").is_none());

    // With negotiation on, the miss is repaired like any unpinned query.
    let negotiating = ClientFetcher::builder(ENDPOINT)
        .transport(transport.clone())
        .persisted_queries(true)
        .build()
        .unwrap();
    let response = negotiating
        .fetch(
            &Document::new(text).with_document_id(""),
            None,
            RequestOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.data, Some(json!({"foo": 2})));
    assert_eq!(
        transport.methods(),
        vec![HttpMethod::Post, HttpMethod::Get, HttpMethod::Post]
    );
    assert!(!query_params(&transport, 1).contains_key("documentId"));
    assert_eq!(transport.body(2)["query"], text);
}

#[tokio::test]
async fn test_headers_are_merged() {
    let transport = MockTransport::new();
    let fetcher = ClientFetcher::builder(ENDPOINT)
        .transport(transport.clone())
        .header("X-Client", "storefront")
        .header("X-Locale", "en")
        .build()
        .unwrap();

    fetcher
        .fetch(
            &Document::new("query q { foo }"),
            None,
            RequestOptions::new().header("x-locale", "nl").unwrap(),
        )
        .await
        .unwrap();

    let headers = &transport.calls()[0].headers;
    assert_eq!(headers.get("x-client").unwrap(), "storefront");
    assert_eq!(headers.get("x-locale").unwrap(), "nl");
    assert_eq!(headers.get_all("x-locale").iter().count(), 1);
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
}

#[tokio::test]
async fn test_strict_partial_result() {
    let transport = MockTransport::new().reply(Reply::Json(
        200,
        json!({
            "data": {"firstShip": "3001", "secondShip": null},
            "errors": [{"message": "Unexpected error.", "path": ["secondShip"]}]
        }),
    ));
    let fetcher = client(transport, false);

    let data = fetcher
        .fetch_strict(
            &Document::new("query ships { firstShip secondShip }"),
            None,
            RequestOptions::new(),
        )
        .await
        .unwrap();

    let first: String = data.field("firstShip").unwrap();
    assert_eq!(first, "3001");

    let err = data.get("secondShip").unwrap_err();
    assert!(err.to_string().contains("Unexpected error."));
}

#[tokio::test]
async fn test_strict_without_data_fails() {
    let transport = MockTransport::new().reply(Reply::Json(
        200,
        json!({"data": null, "errors": [{"message": "a"}, {"message": "b"}]}),
    ));
    let fetcher = client(transport, false);

    let err = fetcher
        .fetch_strict(&Document::new("query q { foo }"), None, RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.graphql_errors().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout() {
    let transport = MockTransport::new()
        .reply_after(Duration::from_secs(60), Reply::data(json!({"foo": 1})));
    let fetcher = client(transport, false);

    let err = fetcher
        .fetch(&Document::new("query q { foo }"), None, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_secs(30)));
    assert!(err.is_cancellation());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_covers_probe_and_fallback() {
    let transport = MockTransport::new()
        .reply_after(Duration::from_millis(80), Reply::not_found())
        .reply_after(Duration::from_millis(80), Reply::data(json!({"foo": 1})));
    let fetcher = ClientFetcher::builder(ENDPOINT)
        .transport(transport.clone())
        .persisted_queries(true)
        .default_timeout(Some(Duration::from_millis(100)))
        .build()
        .unwrap();

    let err = fetcher
        .fetch(&Document::new("query q { foo }"), None, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout(_)));
    assert_eq!(transport.methods(), vec![HttpMethod::Get, HttpMethod::Post]);
}

#[tokio::test]
async fn test_cancel_mid_probe_skips_fallback() {
    let transport = MockTransport::new()
        .reply_after(Duration::from_secs(5), Reply::not_found());
    let fetcher = client(transport.clone(), true);
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = fetcher
        .fetch(&Document::new("query q { foo }"), None, token)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(transport.methods(), vec![HttpMethod::Get]);
}

fn echo_client(transport: EchoTransport) -> ClientFetcher {
    ClientFetcher::builder(ENDPOINT)
        .transport(transport)
        .build()
        .unwrap()
}

fn slow_then_fast() -> (Document, serde_json::Value, serde_json::Value) {
    (
        Document::new("mutation track($id: String!, $delay: Int) { track(id: $id) }"),
        json!({"id": "slow", "delay": 100}),
        json!({"id": "fast", "delay": 0}),
    )
}

#[tokio::test]
async fn test_shared_queue_preserves_submission_order() {
    let transport = EchoTransport::default();
    let fetcher = echo_client(transport.clone());
    let (document, slow, fast) = slow_then_fast();

    let first = fetcher.fetch(&document, Some(slow), RequestOptions::new().queue("cart"));
    let second = fetcher.fetch(&document, Some(fast), RequestOptions::new().queue("cart"));
    // Polling the later call first does not let it overtake.
    let (fast_result, slow_result) = tokio::join!(second, first);

    assert!(fast_result.is_ok() && slow_result.is_ok());
    assert_eq!(*transport.completed.lock(), vec!["slow", "fast"]);
}

#[tokio::test]
async fn test_unqueued_calls_complete_out_of_order() {
    let transport = EchoTransport::default();
    let fetcher = echo_client(transport.clone());
    let (document, slow, fast) = slow_then_fast();

    let first = fetcher.fetch(&document, Some(slow), RequestOptions::new());
    let second = fetcher.fetch(&document, Some(fast), RequestOptions::new());
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_ok() && second.is_ok());
    assert_eq!(*transport.completed.lock(), vec!["fast", "slow"]);
}

#[tokio::test]
async fn test_distinct_queues_do_not_block_each_other() {
    let transport = EchoTransport::default();
    let fetcher = echo_client(transport.clone());
    let (document, slow, fast) = slow_then_fast();

    let first = fetcher.fetch(&document, Some(slow), RequestOptions::new().queue("cart"));
    let second = fetcher.fetch(&document, Some(fast), RequestOptions::new().queue("wishlist"));
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_ok() && second.is_ok());
    assert_eq!(*transport.completed.lock(), vec!["fast", "slow"]);
    assert_eq!(fetcher.queues().queue_names(), vec!["cart", "wishlist"]);
}

#[tokio::test]
async fn test_failed_call_releases_queue() {
    let transport = MockTransport::new()
        .reply(Reply::Raw(500, "boom"))
        .reply(Reply::data(json!({"ok": true})));
    let fetcher = client(transport.clone(), false);
    let document = Document::new("mutation m { ok }");

    let first = fetcher.fetch(&document, None, RequestOptions::new().queue("q"));
    let second = fetcher.fetch(&document, None, RequestOptions::new().queue("q"));
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_err());
    assert!(second.unwrap().is_success());
}
