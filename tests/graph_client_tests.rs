//! Integration tests for the Graph client, pagination and identity cache
//!
//! Uses wiremock to stand in for Graph and checks request counts, partial
//! page collections and sentinel fallbacks.

use exp365::error::Exp365Error;
use exp365::graph::GraphClient;
use exp365::graph::users::{FORMER_MEMBER, ResolutionStatus, UserResolver};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client = GraphClient::new("test-token").with_base_url(format!("{}/v1.0", server.uri()));
    (server, client)
}

fn page(values: serde_json::Value, next: Option<String>) -> ResponseTemplate {
    let mut body = serde_json::json!({ "value": values });
    if let Some(next) = next {
        body["@odata.nextLink"] = serde_json::Value::String(next);
    }
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn test_get_sends_bearer_token() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/planner/plans/p1"))
        .and(wiremock::matchers::header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "p1",
            "title": "Launch"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let plan: serde_json::Value = client.get("planner/plans/p1").await.unwrap();
    assert_eq!(plan["title"], "Launch");
}

#[tokio::test]
async fn test_404_maps_to_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "Request_ResourceNotFound", "message": "Resource 'gone' does not exist"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.get::<serde_json::Value>("users/gone").await;
    assert!(matches!(result, Err(Exp365Error::NotFound(_))));
}

#[tokio::test]
async fn test_server_error_not_retried_by_default() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/error"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"code": "InternalServerError", "message": "Internal server error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.get::<serde_json::Value>("error").await;
    match result {
        Err(Exp365Error::GraphApiError(message)) => assert!(message.contains("500")),
        other => panic!("expected GraphApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_retried_when_enabled() {
    let (server, client) = setup().await;
    let client = client.with_max_retries(1);

    Mock::given(method("GET"))
        .and(path("/v1.0/throttled"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/throttled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let body: serde_json::Value = client.get("throttled").await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_collect_pages_follows_next_links() {
    let (server, client) = setup().await;
    let base = format!("{}/v1.0", server.uri());

    Mock::given(method("GET"))
        .and(path("/v1.0/items"))
        .respond_with(page(
            serde_json::json!([{"id": "1"}, {"id": "2"}]),
            Some(format!("{}/items/page2", base)),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/items/page2"))
        .respond_with(page(
            serde_json::json!([{"id": "3"}]),
            Some(format!("{}/items/page3", base)),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/items/page3"))
        .respond_with(page(serde_json::json!([{"id": "4"}]), None))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.collect_pages::<serde_json::Value>("items").await;
    let ids: Vec<&str> = result.items.iter().map(|v| v["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert_eq!(result.pages, 3);
    assert!(result.complete);
}

#[tokio::test]
async fn test_collect_pages_keeps_partial_results_on_failure() {
    let (server, client) = setup().await;
    let base = format!("{}/v1.0", server.uri());

    Mock::given(method("GET"))
        .and(path("/v1.0/items"))
        .respond_with(page(
            serde_json::json!([{"id": "1"}, {"id": "2"}]),
            Some(format!("{}/items/page2", base)),
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/items/page2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.collect_pages::<serde_json::Value>("items").await;
    assert_eq!(result.len(), 2);
    assert_eq!(result.pages, 1);
    assert!(!result.complete);
}

#[tokio::test]
async fn test_collect_pages_first_page_failure_is_empty() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/items"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = client.collect_pages::<serde_json::Value>("items").await;
    assert!(result.is_empty());
    assert_eq!(result.pages, 0);
    assert!(!result.complete);
}

#[tokio::test]
async fn test_collect_pages_limited_stops_at_cap() {
    let (server, client) = setup().await;
    let base = format!("{}/v1.0", server.uri());

    Mock::given(method("GET"))
        .and(path("/v1.0/items"))
        .respond_with(page(
            serde_json::json!([{"id": "1"}]),
            Some(format!("{}/items/page2", base)),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/items/page2"))
        .respond_with(page(serde_json::json!([{"id": "2"}]), None))
        .expect(0)
        .mount(&server)
        .await;

    let result = client.collect_pages_limited::<serde_json::Value>("items", 1).await;
    assert_eq!(result.len(), 1);
    assert!(!result.complete);
}

#[tokio::test]
async fn test_request_delay_applies_to_every_request() {
    let (server, client) = setup().await;
    let client = client.with_request_delay(Duration::from_millis(150));
    let base = format!("{}/v1.0", server.uri());

    Mock::given(method("GET"))
        .and(path("/v1.0/items"))
        .respond_with(page(serde_json::json!([1]), Some(format!("{}/items/page2", base))))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/items/page2"))
        .respond_with(page(serde_json::json!([2]), None))
        .mount(&server)
        .await;

    let started = Instant::now();
    let result = client.collect_pages::<u32>("items").await;
    assert_eq!(result.items, vec![1, 2]);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_resolver_queries_each_user_once() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "u1",
            "displayName": "Alice Smith"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut resolver = UserResolver::new(&client);
    assert_eq!(resolver.resolve("u1").await, "Alice Smith");
    assert_eq!(resolver.resolve("u1").await, "Alice Smith");
    assert_eq!(resolver.lookups(), 1);
    assert_eq!(resolver.status("u1"), Some(ResolutionStatus::Resolved));
}

#[tokio::test]
async fn test_resolver_sentinel_for_deleted_user() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/deleted"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut resolver = UserResolver::new(&client);
    assert_eq!(resolver.resolve("deleted").await, FORMER_MEMBER);
    assert_eq!(resolver.resolve("deleted").await, FORMER_MEMBER);
    assert_eq!(resolver.status("deleted"), Some(ResolutionStatus::NotFound));
}

#[tokio::test]
async fn test_resolver_sentinel_for_failed_lookup() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut resolver = UserResolver::new(&client);
    assert_eq!(resolver.resolve("flaky").await, FORMER_MEMBER);
    // cached, not retried
    assert_eq!(resolver.resolve("flaky").await, FORMER_MEMBER);
    assert_eq!(resolver.status("flaky"), Some(ResolutionStatus::Error));
}
