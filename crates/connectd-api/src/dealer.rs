//! Dealer push-messaging connection.
//!
//! A persistent websocket authenticated with a Login5 access token. The
//! backend pushes JSON frames addressed by a hierarchical `uri`; every
//! subscription registered with [`Dealer::receive_message`] whose prefix
//! matches a message's uri gets its own copy of that message.
//!
//! The read loop starts on the first subscription. Messages pushed right
//! after the upgrade (the connection id in particular) wait on the socket
//! until then instead of being dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;

const MESSAGE_CHANNEL_CAPACITY: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PING_FRAME: &str = r#"{"type":"ping"}"#;
const PONG_FRAME: &str = r#"{"type":"pong"}"#;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Message ──────────────────────────────────────────────────────────

/// A message pushed by the dealer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uri: String,
    pub headers: HashMap<String, String>,
    /// Decoded payload bytes. Gzip-encoded pushes are passed through as-is.
    pub payload: Bytes,
}

impl Message {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Wire frame as sent over the websocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Frame {
    Message {
        uri: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        payloads: Vec<serde_json::Value>,
    },
    Request {
        #[serde(default)]
        message_ident: Option<String>,
    },
    Ping,
    Pong,
}

fn parse_frame(text: &str) -> Option<Frame> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            debug!(error = %e, "failed to parse dealer frame");
            None
        }
    }
}

/// String payloads are base64; structured ones are kept as their JSON text.
fn decode_payloads(payloads: &[serde_json::Value]) -> Bytes {
    let mut out = Vec::new();
    for payload in payloads {
        match payload {
            serde_json::Value::String(text) => match STANDARD.decode(text) {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(_) => out.extend_from_slice(text.as_bytes()),
            },
            other => out.extend_from_slice(other.to_string().as_bytes()),
        }
    }
    Bytes::from(out)
}

// ── Subscriptions ────────────────────────────────────────────────────

struct Subscription {
    prefixes: Vec<String>,
    tx: mpsc::Sender<Message>,
}

impl Subscription {
    fn matches(&self, uri: &str) -> bool {
        self.prefixes.iter().any(|prefix| uri.starts_with(prefix.as_str()))
    }
}

type Subscriptions = Arc<Mutex<Vec<Subscription>>>;

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, Vec<Subscription>> {
    subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Dealer ───────────────────────────────────────────────────────────

/// Handle to a running dealer connection.
pub struct Dealer {
    endpoint: String,
    subscriptions: Subscriptions,
    start: Arc<Notify>,
    cancel: CancellationToken,
}

impl Dealer {
    /// Open the websocket at `url`, authenticating with `access_token`.
    ///
    /// Returns once the upgrade succeeded. The connection id is *not*
    /// known yet: it arrives later as a message on
    /// `hm://pusher/v1/connections/`.
    pub async fn connect(url: &Url, access_token: &SecretString) -> Result<Self, Error> {
        let endpoint = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        );

        let mut authed = url.clone();
        authed
            .query_pairs_mut()
            .append_pair("access_token", access_token.expose_secret());

        info!(endpoint = %endpoint, "connecting to dealer");

        let (ws, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(authed.as_str()))
                .await
                .map_err(|_| Error::Timeout {
                    timeout_secs: CONNECT_TIMEOUT.as_secs(),
                })?
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        debug!("dealer websocket connected");

        let subscriptions: Subscriptions = Arc::new(Mutex::new(Vec::new()));
        let start = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        tokio::spawn(drive(
            ws,
            Arc::clone(&subscriptions),
            Arc::clone(&start),
            cancel.clone(),
        ));

        Ok(Self {
            endpoint,
            subscriptions,
            start,
            cancel,
        })
    }

    /// Subscribe to every message whose uri starts with one of `prefixes`.
    ///
    /// Subscriptions are not exclusive: a message matching several of them
    /// is delivered to each. After [`close`](Self::close) the returned
    /// stream is already at its end.
    pub fn receive_message(&self, prefixes: &[&str]) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        if self.cancel.is_cancelled() {
            return rx;
        }

        lock(&self.subscriptions).push(Subscription {
            prefixes: prefixes.iter().map(|prefix| (*prefix).to_owned()).collect(),
            tx,
        });

        if self.cancel.is_cancelled() {
            lock(&self.subscriptions).clear();
        }

        self.start.notify_one();
        rx
    }

    /// End the connection and every subscription. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(endpoint = %self.endpoint, "closing dealer");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Dealer {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Background connection task ───────────────────────────────────────

async fn drive(
    mut ws: WsStream,
    subscriptions: Subscriptions,
    start: Arc<Notify>,
    cancel: CancellationToken,
) {
    let started = tokio::select! {
        _ = cancel.cancelled() => false,
        () = start.notified() => true,
    };

    if started {
        let mut keepalive = tokio::time::interval(PING_INTERVAL);
        // The first tick completes immediately.
        keepalive.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = keepalive.tick() => {
                    if let Err(e) = ws.send(WsMessage::text(PING_FRAME.to_owned())).await {
                        warn!(error = %e, "failed sending dealer ping");
                        break;
                    }
                }
                frame = ws.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => match parse_frame(text.as_str()) {
                        Some(Frame::Message { uri, headers, payloads }) => {
                            let message = Message {
                                uri,
                                headers,
                                payload: decode_payloads(&payloads),
                            };
                            dispatch(&subscriptions, message, &cancel).await;
                        }
                        Some(Frame::Ping) => {
                            if let Err(e) = ws.send(WsMessage::text(PONG_FRAME.to_owned())).await {
                                warn!(error = %e, "failed answering dealer ping");
                                break;
                            }
                        }
                        Some(Frame::Pong) => trace!("dealer pong"),
                        Some(Frame::Request { message_ident }) => {
                            debug!(?message_ident, "ignoring dealer request");
                        }
                        None => {}
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "dealer close frame received");
                        } else {
                            info!("dealer close frame received (no payload)");
                        }
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "dealer connection failed");
                        break;
                    }
                    None => {
                        info!("dealer stream ended");
                        break;
                    }
                },
            }
        }
    }

    if let Err(e) = ws.close(None).await {
        debug!(error = %e, "error while closing dealer websocket");
    }
    // Cancel before clearing: `receive_message` re-checks the token after pushing.
    cancel.cancel();
    lock(&subscriptions).clear();
    debug!("dealer connection task exiting");
}

/// Deliver `message` to every matching subscription, in registration order.
async fn dispatch(subscriptions: &Subscriptions, message: Message, cancel: &CancellationToken) {
    let targets: Vec<mpsc::Sender<Message>> = {
        let mut subs = lock(subscriptions);
        subs.retain(|sub| !sub.tx.is_closed());
        subs.iter()
            .filter(|sub| sub.matches(&message.uri))
            .map(|sub| sub.tx.clone())
            .collect()
    };

    if targets.is_empty() {
        trace!(uri = %message.uri, "dropping dealer message with no subscriber");
        return;
    }

    for tx in targets {
        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(message.clone()) => {
                if sent.is_err() {
                    trace!(uri = %message.uri, "subscriber went away");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn subscription(prefixes: &[&str]) -> (Subscription, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        let sub = Subscription {
            prefixes: prefixes.iter().map(|p| (*p).to_owned()).collect(),
            tx,
        };
        (sub, rx)
    }

    fn message(uri: &str) -> Message {
        Message {
            uri: uri.to_owned(),
            headers: HashMap::new(),
            payload: Bytes::new(),
        }
    }

    #[test]
    fn parse_message_frame() {
        let text = r#"{
            "type": "message",
            "uri": "hm://pusher/v1/connections/abc",
            "headers": { "Spotify-Connection-Id": "abc" },
            "method": "PUT"
        }"#;

        let Some(Frame::Message { uri, headers, payloads }) = parse_frame(text) else {
            panic!("expected message frame");
        };
        assert_eq!(uri, "hm://pusher/v1/connections/abc");
        assert_eq!(headers["Spotify-Connection-Id"], "abc");
        assert!(payloads.is_empty());
    }

    #[test]
    fn parse_ping_and_unknown_frames() {
        assert!(matches!(parse_frame(r#"{"type":"ping"}"#), Some(Frame::Ping)));
        assert!(parse_frame(r#"{"type":"hello"}"#).is_none());
        assert!(parse_frame("not json").is_none());
    }

    #[test]
    fn string_payloads_are_base64_decoded() {
        let payloads = vec![
            serde_json::json!("aGVsbG8g"),
            serde_json::json!("d29ybGQ="),
        ];
        assert_eq!(decode_payloads(&payloads).as_ref(), b"hello world");
    }

    #[test]
    fn structured_payloads_are_kept_as_json() {
        let payloads = vec![serde_json::json!({ "volume": 100 })];
        assert_eq!(decode_payloads(&payloads).as_ref(), br#"{"volume":100}"#);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut msg = message("hm://pusher/v1/connections/x");
        msg.headers
            .insert("spotify-connection-id".into(), "abc123".into());
        assert_eq!(msg.header("Spotify-Connection-Id"), Some("abc123"));
        assert_eq!(msg.header("Content-Type"), None);
    }

    #[tokio::test]
    async fn dispatch_fans_out_to_every_matching_prefix() {
        let (broad, mut broad_rx) = subscription(&["hm://connect-state/v1/"]);
        let (narrow, mut narrow_rx) = subscription(&["hm://connect-state/v1/cluster"]);
        let (other, mut other_rx) = subscription(&["hm://pusher/v1/connections/"]);
        let subs: Subscriptions = Arc::new(Mutex::new(vec![broad, narrow, other]));
        let cancel = CancellationToken::new();

        dispatch(&subs, message("hm://connect-state/v1/cluster"), &cancel).await;

        assert_eq!(broad_rx.try_recv().unwrap().uri, "hm://connect-state/v1/cluster");
        assert_eq!(narrow_rx.try_recv().unwrap().uri, "hm://connect-state/v1/cluster");
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_prunes_dropped_subscribers() {
        let (gone, gone_rx) = subscription(&["hm://"]);
        let (kept, mut kept_rx) = subscription(&["hm://"]);
        let subs: Subscriptions = Arc::new(Mutex::new(vec![gone, kept]));
        drop(gone_rx);

        dispatch(&subs, message("hm://anything"), &CancellationToken::new()).await;

        assert_eq!(lock(&subs).len(), 1);
        assert!(kept_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dispatch_preserves_order_per_subscriber() {
        let (sub, mut rx) = subscription(&["hm://a/"]);
        let subs: Subscriptions = Arc::new(Mutex::new(vec![sub]));
        let cancel = CancellationToken::new();

        for i in 0..5 {
            dispatch(&subs, message(&format!("hm://a/{i}")), &cancel).await;
        }
        for i in 0..5 {
            assert_eq!(rx.try_recv().unwrap().uri, format!("hm://a/{i}"));
        }
    }
}
