//! HTTP transport tests against a mock gateway.

use gatesync_engine::{
    start_session, GatewayProperties, GatewayTransport, HttpTransport, ReplicatorConfig,
    SessionSupervisor, SyncError, SyncRequest,
};
use gatesync_protocol::{ActivityLevel, BulkDocsRequest, ChangesRequest, Sequence};
use gatesync_store::LocalStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// "alice:p"
const ALICE_AUTH: &str = "Basic YWxpY2U6cA==";

fn config(server: &MockServer, channels: &[&str], mode: Option<&str>) -> ReplicatorConfig {
    let request = SyncRequest::new(
        "alice",
        "p",
        channels.iter().map(|c| c.to_string()).collect(),
    );
    let props = GatewayProperties::new(format!("{}/db", server.uri()));
    ReplicatorConfig::build(&request, &props, mode)
        .unwrap()
        .with_request_timeout(Duration::from_secs(5))
}

fn changes_body() -> serde_json::Value {
    json!({
        "results": [
            {"seq": 1, "id": "order::1", "changes": [{"rev": "1-a"}],
             "doc": {"_id": "order::1", "_rev": "1-a", "total": 10}},
            {"seq": 2, "id": "order::2", "changes": [{"rev": "3-b"}], "deleted": true}
        ],
        "last_seq": 2
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn changes_request_carries_auth_and_channels() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db/_changes"))
        .and(header("authorization", ALICE_AUTH))
        .and(query_param("filter", "sync_gateway/bychannel"))
        .and(query_param("channels", "orders,invoices"))
        .and(query_param("include_docs", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_body()))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server, &["orders", "invoices"], None);
    let response = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        transport.changes(&ChangesRequest::new(config.channels().to_vec(), 200))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.last_seq, Sequence::new("2"));
    assert!(response.results[1].flags().deleted);
}

#[tokio::test(flavor = "multi_thread")]
async fn since_is_sent_when_resuming() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db/_changes"))
        .and(query_param("since", "41"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"results": [], "last_seq": 41})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server, &["orders"], None);
    tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        let request = ChangesRequest::new(vec!["orders".into()], 10)
            .with_since(Some(Sequence::new("41")));
        transport.changes(&request)
    })
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_maps_to_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db/_changes"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "Unauthorized",
            "reason": "Invalid login"
        })))
        .mount(&server)
        .await;

    let config = config(&server, &["orders"], None);
    let err = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        transport.changes(&ChangesRequest::new(vec!["orders".into()], 10))
    })
    .await
    .unwrap()
    .unwrap_err();

    match err {
        SyncError::Http { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "unauthorized");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_feed_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db/_changes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let config = config(&server, &["orders"], None);
    let err = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        transport.changes(&ChangesRequest::new(vec!["orders".into()], 10))
    })
    .await
    .unwrap()
    .unwrap_err();

    assert!(matches!(err, SyncError::Protocol(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_docs_posts_documents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/db/_bulk_docs"))
        .and(header("authorization", ALICE_AUTH))
        .and(body_partial_json(json!({"new_edits": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {"id": "a", "rev": "2-x"},
            {"id": "b", "error": "conflict", "reason": "Document update conflict"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server, &["orders"], Some("Push"));
    let results = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        let mut request = BulkDocsRequest::new();
        request.push("a", Some("1-a"), &json!({"n": 1}));
        request.push("b", Some("1-b"), &json!({"n": 2}));
        transport.bulk_docs(&request)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(results[0].accepted_rev(), Some("2-x"));
    assert_eq!(results[1].accepted_rev(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn one_shot_pull_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db/_changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_body()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&server, &["orders"], None);
    let store = Arc::new(LocalStore::new("syncdb", dir.path()));

    let (outcome, saved) = tokio::task::spawn_blocking(move || {
        let handle = start_session(config, Arc::clone(&store)).unwrap();
        let outcome = SessionSupervisor::new()
            .with_interval(Duration::from_millis(100))
            .run(handle, &store);

        store.open().unwrap();
        let saved = (
            store.get("order::1").unwrap().map(|d| d.body),
            store.get("order::2").unwrap(),
        );
        store.close().unwrap();
        (outcome, saved)
    })
    .await
    .unwrap();

    let status = outcome.final_status.unwrap();
    assert_eq!(status.activity, ActivityLevel::Stopped);
    assert!(status.error.is_none());
    assert_eq!(status.progress.completed, 2);
    assert_eq!(saved.0, Some(json!({"total": 10})));
    assert!(saved.1.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn one_shot_pull_unauthorized_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db/_changes"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&server, &["orders"], None);
    let store = Arc::new(LocalStore::new("syncdb", dir.path()));

    let outcome = tokio::task::spawn_blocking(move || {
        let handle = start_session(config, Arc::clone(&store)).unwrap();
        let outcome = SessionSupervisor::new().run(handle, &store);
        assert!(!store.is_open());
        outcome
    })
    .await
    .unwrap();

    assert!(outcome.is_error());
    let error = outcome.final_status.unwrap().error.unwrap();
    assert_eq!(error.code, 401);
    assert_eq!(error.message, "unauthorized");
}
