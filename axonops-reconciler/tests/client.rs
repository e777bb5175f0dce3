//! Integration tests for the control-plane client against the fake control plane.

mod common;

use axonops_reconciler::{ClientConfig, ControlPlaneClient, Error};
use axum::http::{Method, StatusCode};
use common::{allocate_port, FakeControlPlane};
use serde_json::{json, Value};

const NODES: &str = "/api/v1/nodes/acme/cassandra/prod";

#[tokio::test]
async fn test_login_once_and_reuse_session() {
    let fake = FakeControlPlane::spawn().await;
    fake.state().login_token = Some("session-1".to_string());

    let client =
        ControlPlaneClient::new(ClientConfig::anonymous(&fake.base_url()).with_login("admin", "pw"))
            .expect("Failed to build client");

    let _: Option<Value> = client.get(NODES).await.expect("First GET failed");
    let _: Option<Value> = client.get(NODES).await.expect("Second GET failed");

    let requests = fake.requests();
    let logins: Vec<_> = requests.iter().filter(|r| r.path == "/api/login").collect();
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].json(), json!({"username": "admin", "password": "pw"}));

    let calls: Vec<_> = requests.iter().filter(|r| r.path == NODES).collect();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert_eq!(call.authorization.as_deref(), Some("Bearer session-1"));
    }
}

#[tokio::test]
async fn test_session_token_replaces_explicit_bearer() {
    let fake = FakeControlPlane::spawn().await;
    fake.state().login_token = Some("session-1".to_string());

    let client = ControlPlaneClient::new(
        ClientConfig::anonymous(&fake.base_url())
            .with_auth_token("explicit")
            .with_login("admin", "pw"),
    )
    .expect("Failed to build client");

    let _: Option<Value> = client.get(NODES).await.expect("GET failed");
    client
        .post("/api/v1/alert-rules/acme/cassandra/prod", &json!({"id": "x"}))
        .await
        .expect("POST failed");

    let requests = fake.requests();
    assert_eq!(requests[0].path, "/api/login");
    assert_eq!(requests.len(), 3);
    for call in &requests[1..] {
        assert_eq!(call.authorization.as_deref(), Some("Bearer session-1"));
    }
}

#[tokio::test]
async fn test_api_token_skips_login() {
    let fake = FakeControlPlane::spawn().await;
    fake.state().login_token = Some("unused".to_string());

    let client = ControlPlaneClient::new(
        ClientConfig::anonymous(&fake.base_url())
            .with_api_token("k3y")
            .with_login("admin", "pw"),
    )
    .expect("Failed to build client");

    let _: Option<Value> = client.get(NODES).await.expect("GET failed");

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("AxonApi k3y"));
}

#[tokio::test]
async fn test_rejected_login() {
    let fake = FakeControlPlane::spawn().await;

    let client =
        ControlPlaneClient::new(ClientConfig::anonymous(&fake.base_url()).with_login("admin", "bad"))
            .expect("Failed to build client");

    let err = client.get::<Value>(NODES).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)), "got {:?}", err);
    assert!(fake.requests().iter().all(|r| r.path == "/api/login"));
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let fake = FakeControlPlane::spawn().await;
    fake.state().fail = Some((
        Method::GET,
        NODES.to_string(),
        StatusCode::INTERNAL_SERVER_ERROR,
    ));

    let client = ControlPlaneClient::new(ClientConfig::anonymous(&fake.base_url()))
        .expect("Failed to build client");

    match client.get::<Value>(NODES).await {
        Err(Error::ApiStatus {
            method,
            url,
            status,
            body,
        }) => {
            assert_eq!(method, Method::GET);
            assert!(url.ends_with(NODES));
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "injected failure");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_response_bodies() {
    let fake = FakeControlPlane::spawn().await;
    let client = ControlPlaneClient::new(ClientConfig::anonymous(&fake.base_url()))
        .expect("Failed to build client");

    // 204 with no body
    let deleted = client
        .delete("/api/v1/alert-rules/acme/cassandra/prod/missing")
        .await
        .expect("DELETE failed");
    assert!(deleted.is_none());

    // a 200 whose body is not JSON: fatal on reads, ignored on writes
    fake.state().fail = Some((Method::GET, NODES.to_string(), StatusCode::OK));
    let err = client.get::<Value>(NODES).await.unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "got {:?}", err);

    fake.state().fail = Some((
        Method::POST,
        "/api/v1/alert-rules".to_string(),
        StatusCode::OK,
    ));
    let posted = client
        .post("/api/v1/alert-rules/acme/cassandra/prod", &json!({"id": "x"}))
        .await
        .expect("POST failed");
    assert!(posted.is_none());
}

#[tokio::test]
async fn test_unreachable_control_plane() {
    let port = allocate_port();
    let client = ControlPlaneClient::new(ClientConfig::anonymous(&format!(
        "http://127.0.0.1:{}",
        port
    )))
    .expect("Failed to build client");

    let err = client.get::<Value>(NODES).await.unwrap_err();
    match err {
        Error::Transport { method, .. } => assert_eq!(method, Method::GET),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_during_login() {
    let port = allocate_port();
    let client = ControlPlaneClient::new(
        ClientConfig::anonymous(&format!("http://127.0.0.1:{}", port)).with_login("admin", "pw"),
    )
    .expect("Failed to build client");

    match client.get::<Value>(NODES).await.unwrap_err() {
        Error::Transport { method, url, .. } => {
            assert_eq!(method, Method::POST);
            assert!(url.ends_with("/api/login"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
