//! Integration tests for single-flight session refresh: one refresh call no
//! matter how many requests observe the expired credential, FIFO replay on
//! success, cascade on failure, and clean state recovery between cycles.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wayfare_client::{Client, ClientConfig, Error, SessionEvent};

const REFRESH_PATH: &str = "/api/auth/refresh";

async fn client_for(server: &MockServer) -> Client {
    let config = ClientConfig::new(&server.uri()).unwrap();
    Client::new(config).unwrap()
}

/// Mount a path that answers 401 once, then the given success body.
async fn expire_once_then_succeed(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn refresh_count(received: &[wiremock::Request]) -> usize {
    received.iter().filter(|r| r.url.path() == REFRESH_PATH).count()
}

#[tokio::test]
async fn concurrent_expiries_trigger_exactly_one_refresh() {
    let server = MockServer::start().await;

    expire_once_then_succeed(&server, "/profile", json!({"route": "profile"})).await;
    expire_once_then_succeed(&server, "/feed", json!({"route": "feed"})).await;
    expire_once_then_succeed(&server, "/bookmarks", json!({"route": "bookmarks"})).await;

    // The delay keeps the refresh in flight long enough for every caller to
    // observe its own 401 and park.
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    let (profile, feed, bookmarks) =
        tokio::join!(client.get("/profile"), client.get("/feed"), client.get("/bookmarks"));

    // Every caller receives its own response body post-replay.
    assert_eq!(profile.unwrap().body.unwrap()["route"], json!("profile"));
    assert_eq!(feed.unwrap().body.unwrap()["route"], json!("feed"));
    assert_eq!(bookmarks.unwrap().body.unwrap()["route"], json!("bookmarks"));

    let received = server.received_requests().await.unwrap();
    assert_eq!(refresh_count(&received), 1);
}

#[tokio::test]
async fn two_gets_replay_with_their_original_bodies() {
    // The example scenario: /profile and /feed both 401, refresh succeeds,
    // each is reissued exactly once and returns its 2xx body.
    let server = MockServer::start().await;

    expire_once_then_succeed(&server, "/profile", json!({"username": "mira"})).await;
    expire_once_then_succeed(&server, "/feed", json!({"posts": []})).await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let (profile, feed) = tokio::join!(client.get("/profile"), client.get("/feed"));

    assert_eq!(profile.unwrap().body.unwrap()["username"], json!("mira"));
    assert_eq!(feed.unwrap().body.unwrap()["posts"], json!([]));

    let received = server.received_requests().await.unwrap();
    assert_eq!(refresh_count(&received), 1);
    // one original attempt + one replay per route
    assert_eq!(received.iter().filter(|r| r.url.path() == "/profile").count(), 2);
    assert_eq!(received.iter().filter(|r| r.url.path() == "/feed").count(), 2);
}

#[tokio::test]
async fn refresh_rejection_cascades_to_every_waiter() {
    let server = MockServer::start().await;

    for route in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut events = client.session_events();

    let (a, b, c) = tokio::join!(client.get("/a"), client.get("/b"), client.get("/c"));
    let outcomes = [a, b, c];

    // The refresher resolves with its original 401; the parked callers share
    // the refresh failure.
    let originals = outcomes
        .iter()
        .filter(|o| matches!(o, Err(Error::Status { status, .. }) if status.as_u16() == 401))
        .count();
    let cascaded = outcomes
        .iter()
        .filter(|o| matches!(o, Err(Error::RefreshFailed { status: Some(401), .. })))
        .count();
    assert_eq!(originals, 1);
    assert_eq!(cascaded, 2);

    // No replays were issued: each route saw exactly its original request.
    let received = server.received_requests().await.unwrap();
    for route in ["/a", "/b", "/c"] {
        assert_eq!(received.iter().filter(|r| r.url.path() == route).count(), 1);
    }
    assert_eq!(refresh_count(&received), 1);

    // The hosting application is told to force re-authentication.
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn refresh_transport_failure_cascades_without_session_event() {
    let server = MockServer::start().await;

    for route in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
    }

    // Refresh times out at the transport level instead of answering.
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let config = ClientConfig::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(200))
        .with_retry_limit(0);
    let client = Client::new(config).unwrap();
    let mut events = client.session_events();

    let (a, b) = tokio::join!(client.get("/a"), client.get("/b"));
    let outcomes = [a, b];

    let originals = outcomes
        .iter()
        .filter(|o| matches!(o, Err(Error::Status { status, .. }) if status.as_u16() == 401))
        .count();
    let cascaded = outcomes
        .iter()
        .filter(|o| matches!(o, Err(Error::RefreshFailed { status: None, .. })))
        .count();
    assert_eq!(originals, 1);
    assert_eq!(cascaded, 1);

    // Transport failures do not mean the credential is unusable.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn refresh_endpoint_failures_do_not_recurse() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    // A direct call to the refresh endpoint failing with 401 is surfaced
    // as-is - it must not enqueue itself or start another refresh.
    match client.post(REFRESH_PATH, json!({})).await {
        Err(Error::Status { status, .. }) => assert_eq!(status.as_u16(), 401),
        other => panic!("expected status error, got {other:?}"),
    }

    let received = server.received_requests().await.unwrap();
    assert_eq!(refresh_count(&received), 1);
}

#[tokio::test]
async fn coordinator_recovers_after_a_failed_cycle() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2]})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    // First cycle: refresh fails, the caller keeps its original 401.
    match client.get("/items").await {
        Err(Error::Status { status, .. }) => assert_eq!(status.as_u16(), 401),
        other => panic!("expected status error, got {other:?}"),
    }

    // Second cycle starts fresh: refresh succeeds and the replay goes through.
    let response = client.get("/items").await.unwrap();
    assert_eq!(response.body.unwrap()["items"], json!([1, 2]));

    let received = server.received_requests().await.unwrap();
    assert_eq!(refresh_count(&received), 2);
}
