#![allow(clippy::unwrap_used)]

// Integration tests for `Dealer` against a loopback websocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use url::Url;

use connectd_api::{Dealer, Error};

type ServerWs = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

// ── Fake dealer ─────────────────────────────────────────────────────

/// Start a websocket server for one client. Resolves to the server end of
/// the socket and the request URI the client used.
async fn serve_one() -> (Url, tokio::task::JoinHandle<(ServerWs, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (uri_tx, uri_rx) = oneshot::channel();
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            let _ = uri_tx.send(req.uri().to_string());
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();
        (ws, uri_rx.await.unwrap())
    });

    (url, handle)
}

async fn connected() -> (Dealer, ServerWs, String) {
    let (url, server) = serve_one().await;
    let dealer = Dealer::connect(&url, &SecretString::from("tok-123".to_owned()))
        .await
        .unwrap();
    let (ws, uri) = server.await.unwrap();
    (dealer, ws, uri)
}

async fn push(ws: &mut ServerWs, frame: serde_json::Value) {
    ws.send(WsMessage::text(frame.to_string())).await.unwrap();
}

fn message(uri: &str) -> serde_json::Value {
    json!({ "type": "message", "uri": uri, "headers": {}, "payloads": [] })
}

/// Next text frame from the client, skipping websocket-level control frames.
async fn next_text(ws: &mut ServerWs) -> Option<String> {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.unwrap()? {
            Ok(WsMessage::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

// ── Connection ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_passes_access_token() {
    let (_dealer, _ws, uri) = connected().await;
    assert!(uri.contains("access_token=tok-123"), "uri was {uri}");
}

#[tokio::test]
async fn test_connect_refused_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let err = Dealer::connect(&url, &SecretString::from("t".to_owned()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::WebSocketConnect(_)));
}

// ── Delivery ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_message_pushed_before_subscribing_is_delivered() {
    let (dealer, mut ws, _) = connected().await;

    push(
        &mut ws,
        json!({
            "type": "message",
            "uri": "hm://pusher/v1/connections/abc",
            "headers": { "Spotify-Connection-Id": "abc123" },
        }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut rx = dealer.receive_message(&["hm://pusher/v1/connections/"]);
    let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.uri, "hm://pusher/v1/connections/abc");
    assert_eq!(msg.header("spotify-connection-id"), Some("abc123"));
}

#[tokio::test]
async fn test_messages_fan_out_to_every_matching_subscription() {
    let (dealer, mut ws, _) = connected().await;
    let mut state = dealer.receive_message(&["hm://connect-state/v1/"]);
    let mut cluster = dealer.receive_message(&["hm://connect-state/v1/cluster"]);
    let mut pusher = dealer.receive_message(&["hm://pusher/v1/connections/"]);

    push(&mut ws, message("hm://connect-state/v1/cluster")).await;
    push(&mut ws, message("hm://connect-state/v1/connect/volume")).await;

    let first = tokio::time::timeout(WAIT, state.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, state.recv()).await.unwrap().unwrap();
    assert_eq!(first.uri, "hm://connect-state/v1/cluster");
    assert_eq!(second.uri, "hm://connect-state/v1/connect/volume");

    let only = tokio::time::timeout(WAIT, cluster.recv()).await.unwrap().unwrap();
    assert_eq!(only.uri, "hm://connect-state/v1/cluster");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cluster.try_recv().is_err());
    assert!(pusher.try_recv().is_err());
}

#[tokio::test]
async fn test_base64_payloads_are_decoded() {
    let (dealer, mut ws, _) = connected().await;
    let mut rx = dealer.receive_message(&["hm://connect-state/v1/"]);

    push(
        &mut ws,
        json!({
            "type": "message",
            "uri": "hm://connect-state/v1/cluster",
            "payloads": ["aGVsbG8g", "d29ybGQ="],
        }),
    )
    .await;

    let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(&msg.payload[..], b"hello world");
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let (dealer, mut ws, _) = connected().await;
    let mut rx = dealer.receive_message(&["hm://"]);

    ws.send(WsMessage::text("not json".to_owned())).await.unwrap();
    push(&mut ws, json!({ "type": "mystery" })).await;
    push(&mut ws, message("hm://after")).await;

    let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.uri, "hm://after");
}

#[tokio::test]
async fn test_server_ping_is_answered_with_pong() {
    let (dealer, mut ws, _) = connected().await;
    let _rx = dealer.receive_message(&["hm://"]);

    push(&mut ws, json!({ "type": "ping" })).await;

    let reply = next_text(&mut ws).await.unwrap();
    let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply, json!({ "type": "pong" }));
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_ends_subscriptions_and_closes_socket() {
    let (dealer, mut ws, _) = connected().await;
    let mut rx = dealer.receive_message(&["hm://"]);

    dealer.close();
    dealer.close();
    assert!(dealer.is_closed());

    let end = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
    assert!(end.is_none());
    assert!(next_text(&mut ws).await.is_none());

    let mut late = dealer.receive_message(&["hm://"]);
    assert!(late.recv().await.is_none());
}

#[tokio::test]
async fn test_server_close_ends_subscriptions() {
    let (dealer, mut ws, _) = connected().await;
    let mut rx = dealer.receive_message(&["hm://"]);

    ws.close(None).await.unwrap();

    let end = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
    assert!(end.is_none());
}
