//! End-to-end tests over real HTTP against a mock backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use estate_auth::{
    AuthError, ClientConfig, CredentialPair, CredentialStore, FileCredentialStore, LoginRedirect,
    RefreshError, RefreshMethod, RequestDescriptor, ReqwestTransport, Role, SessionClient,
    Transport, TransportError,
};
use mockito::{Matcher, Server};
use reqwest::StatusCode;

#[derive(Default)]
struct CountingRedirect(AtomicUsize);

impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn config_for(server: &Server) -> ClientConfig {
    let mut config = ClientConfig::new(format!("{}/api", server.url()));
    config.timeout_secs = 5;
    config
}

#[tokio::test]
async fn test_reqwest_transport_buffers_response() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/api/properties/7")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::json!({ "price": 250000 })))
        .with_status(200)
        .with_header("x-request-id", "abc")
        .with_body(r#"{"id":7,"price":250000}"#)
        .create_async()
        .await;

    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    let request = RequestDescriptor::new(
        reqwest::Method::PUT,
        format!("{}/api/properties/7", server.url()).parse().unwrap(),
    )
    .with_json(&serde_json::json!({ "price": 250000 }))
    .unwrap();

    let response = transport.send(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["x-request-id"], "abc");
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["price"], 250000);
}

#[tokio::test]
async fn test_login_expiry_refresh_and_retry() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/api/auth/login")
        .match_body(Matcher::Json(serde_json::json!({
            "email": "agent@example.com",
            "password": "hunter2",
        })))
        .with_status(200)
        .with_body(r#"{"accessToken":"T1","refreshToken":"R1","user":{"_id":"a-1","role":"agent"}}"#)
        .expect(1)
        .create_async()
        .await;
    let expired = server
        .mock("GET", "/api/appointments")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .with_body(r#"{"message":"jwt expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .match_header("authorization", "Bearer R1")
        .with_status(200)
        .with_body(r#"{"accessToken":"T2","refreshToken":"R2"}"#)
        .expect(1)
        .create_async()
        .await;
    let retried = server
        .mock("GET", "/api/appointments")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server);
    config.credentials_file = Some(dir.path().join("credentials.json"));
    let redirect = Arc::new(CountingRedirect::default());
    let session = SessionClient::open(config, redirect.clone()).unwrap();

    let identity = session.login("agent@example.com", "hunter2").await.unwrap();
    assert_eq!(identity.role, Role::Agent);
    assert_eq!(identity.user_id.as_deref(), Some("a-1"));

    let response = session.client().get("/appointments").await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "[]");

    login.assert_async().await;
    expired.assert_async().await;
    refresh.assert_async().await;
    retried.assert_async().await;
    assert_eq!(redirect.0.load(Ordering::SeqCst), 0);

    // The rotated pair survives a restart.
    let reopened = FileCredentialStore::open(dir.path().join("credentials.json"));
    assert_eq!(reopened.get(), Some(CredentialPair::new("T2", "R2")));
}

#[tokio::test]
async fn test_get_refresh_method() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("GET", "/api/token/refresh")
        .match_header("authorization", "Bearer R1")
        .with_status(200)
        .with_body(r#"{"token":"T2"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = config_for(&server);
    config.refresh_path = "/token/refresh".to_string();
    config.refresh_method = RefreshMethod::Get;
    let store = Arc::new(estate_auth::MemoryCredentialStore::with_pair(
        CredentialPair::new("T1", "R1"),
    ));
    let client = estate_auth::AuthedClient::from_config(
        &config,
        store.clone(),
        Arc::new(CountingRedirect::default()),
    )
    .unwrap();

    let pair = client.coordinator().refresh().await.unwrap();

    refresh.assert_async().await;
    // Refresh token is kept when the server does not rotate it.
    assert_eq!(pair, CredentialPair::new("T2", "R1"));
    assert_eq!(store.get(), Some(pair));
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/auth/login")
        .with_status(200)
        .with_body(r#"{"accessToken":"T1","refreshToken":"R1","role":"owner"}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/properties/3")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(403)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .expect(1)
        .create_async()
        .await;

    let redirect = Arc::new(CountingRedirect::default());
    let session = SessionClient::open(config_for(&server), redirect.clone()).unwrap();
    session.login("owner@example.com", "pw").await.unwrap();

    let err = session.client().delete("properties/3").await.unwrap_err();

    refresh.assert_async().await;
    match err {
        AuthError::AuthExpired {
            reason: RefreshError::Rejected { status, body },
        } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected AuthExpired, got {other:?}"),
    }
    assert!(!session.is_authenticated());
    assert_eq!(redirect.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_login() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/auth/login")
        .with_status(401)
        .with_body(r#"{"message":"Invalid email or password"}"#)
        .create_async()
        .await;

    let session =
        SessionClient::open(config_for(&server), Arc::new(CountingRedirect::default())).unwrap();

    let err = session.login("nobody@example.com", "wrong").await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let config = ClientConfig::new("http://127.0.0.1:1/api");
    let store = Arc::new(estate_auth::MemoryCredentialStore::with_pair(
        CredentialPair::new("T1", "R1"),
    ));
    let client = estate_auth::AuthedClient::from_config(
        &config,
        store.clone(),
        Arc::new(CountingRedirect::default()),
    )
    .unwrap();

    let err = client.get("properties").await.unwrap_err();

    assert!(matches!(
        err,
        AuthError::Transport(TransportError::Connect(_) | TransportError::Request(_))
    ));
    assert_eq!(client.coordinator().refresh_count(), 0);
    assert_eq!(store.get(), Some(CredentialPair::new("T1", "R1")));
}
