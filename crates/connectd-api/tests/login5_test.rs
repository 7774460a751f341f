#![allow(clippy::unwrap_used)]
// Integration tests for `Login5` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use connectd_api::{Error, Login5};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(client_token: Option<&str>) -> (MockServer, Login5) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let login5 = Login5::with_client(
        reqwest::Client::new(),
        base_url,
        "dev-1",
        "client-abc",
        client_token.map(|t| SecretString::from(t.to_owned())),
    );
    (server, login5)
}

fn stored() -> SecretString {
    SecretString::from("c3RvcmVk".to_owned())
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success_captures_token() {
    let (server, mut login5) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .and(body_json(json!({
            "client_info": { "client_id": "client-abc", "device_id": "dev-1" },
            "stored_credential": { "username": "alice", "data": "c3RvcmVk" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": {
                "username": "alice",
                "access_token": "bearer-xyz",
                "stored_credential": "bmV3",
                "access_token_expires_in": 3600,
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(login5.access_token().is_none());
    login5.login("alice", &stored()).await.unwrap();

    let token = login5.access_token().unwrap();
    assert_eq!(token.token.expose_secret(), "bearer-xyz");
    assert_eq!(token.username, "alice");
    assert!(!token.is_expired());
}

#[tokio::test]
async fn test_login_sends_client_token_header() {
    let (server, mut login5) = setup(Some("ct-1")).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .and(header("client-token", "ct-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": {
                "username": "alice",
                "access_token": "bearer-xyz",
                "access_token_expires_in": 60,
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    login5.login("alice", &stored()).await.unwrap();
}

#[tokio::test]
async fn test_login_error_code_is_rejection() {
    let (server, mut login5) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "INVALID_CREDENTIALS" })),
        )
        .mount(&server)
        .await;

    let result = login5.login("alice", &stored()).await;
    assert!(
        matches!(&result, Err(Error::Login5Rejected { message }) if message == "INVALID_CREDENTIALS"),
        "expected Login5Rejected, got: {result:?}"
    );
    assert!(login5.access_token().is_none());
}

#[tokio::test]
async fn test_login_challenge_is_rejection() {
    let (server, mut login5) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "challenges": { "challenges": [{ "hashcash": {} }] }
        })))
        .mount(&server)
        .await;

    let err = login5.login("alice", &stored()).await.unwrap_err();
    assert!(matches!(err, Error::Login5Rejected { .. }));
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_login_http_error_is_status() {
    let (server, mut login5) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = login5.login("alice", &stored()).await;
    assert!(
        matches!(&result, Err(Error::Status { status: 503, body, .. }) if body == "unavailable"),
        "expected Status error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_garbage_body_is_deserialization_error() {
    let (server, mut login5) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = login5.login("alice", &stored()).await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

#[tokio::test]
async fn test_login_out_of_range_expiry_is_deserialization_error() {
    let (server, mut login5) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/v3/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": {
                "username": "alice",
                "access_token": "bearer-xyz",
                "access_token_expires_in": i64::MAX,
            }
        })))
        .mount(&server)
        .await;

    let result = login5.login("alice", &stored()).await;
    assert!(
        matches!(&result, Err(Error::Deserialization { message, .. }) if message.contains("access_token_expires_in")),
        "expected Deserialization error, got: {result:?}"
    );
    assert!(login5.access_token().is_none());
}
