//! Encrypted, authenticated packet connection to an accesspoint.
//!
//! An [`Accesspoint`] is created from a resolved `host:port` address and
//! authenticated once, either with a username and password or with a
//! stored credential blob. After a successful login the connection moves
//! into a background task that answers keepalive pings and routes every
//! inbound packet to the single subscriber registered for its exact
//! [`PacketType`]. Packets with no subscriber are dropped.
//!
//! The routing loop starts reading on the first [`Accesspoint::receive`]
//! call, so packets sent right after the welcome wait in the socket until
//! somebody is listening for them.
//!
//! ```rust,ignore
//! let mut ap = Accesspoint::new("ap.example.com:4070", "device-id")?;
//! ap.connect_user_pass("alice", &password).await?;
//! let mut products = ap.receive(PacketType::ProductInfo)?;
//! while let Some(packet) = products.recv().await { /* ... */ }
//! ap.close();
//! ```

pub mod codec;
pub mod login;
mod packet;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use self::codec::CipherCodec;
use self::login::{ApLoginFailed, ApWelcome, LoginRequest};
use crate::error::Error;

pub use packet::{Packet, PacketType};

const PACKET_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

type Transport = Framed<TcpStream, CipherCodec>;
type Routes = Arc<DashMap<PacketType, mpsc::Sender<Packet>>>;

/// State that only exists after a successful login.
struct Link {
    username: String,
    stored_credentials: SecretString,
    routes: Routes,
    start: Arc<Notify>,
    cancel: CancellationToken,
}

/// Client side of an accesspoint connection.
pub struct Accesspoint {
    addr: String,
    device_id: String,
    timeout: Duration,
    link: Option<Link>,
}

impl Accesspoint {
    /// Prepare a connection to `addr`. No I/O happens until one of the
    /// `connect_*` methods is called.
    pub fn new(addr: &str, device_id: &str) -> Result<Self, Error> {
        let valid = addr
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(Error::InvalidAddress(addr.to_owned()));
        }

        Ok(Self {
            addr: addr.to_owned(),
            device_id: device_id.to_owned(),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            link: None,
        })
    }

    /// Bound the TCP connect + key exchange + login round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connect and authenticate with a username and password.
    pub async fn connect_user_pass(
        &mut self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), Error> {
        let request = LoginRequest::user_pass(username, password, &self.device_id);
        self.connect_with(request).await
    }

    /// Connect and authenticate with a stored credential (base64 blob).
    pub async fn connect_blob(&mut self, username: &str, blob: &SecretString) -> Result<(), Error> {
        let request = LoginRequest::stored(username, blob, &self.device_id);
        self.connect_with(request).await
    }

    async fn connect_with(&mut self, request: LoginRequest) -> Result<(), Error> {
        if self.link.is_some() {
            return Err(Error::Handshake("accesspoint is already connected".into()));
        }

        let timeout_secs = self.timeout.as_secs();
        let (transport, welcome) = tokio::time::timeout(self.timeout, self.login(&request))
            .await
            .map_err(|_| Error::Timeout { timeout_secs })??;

        info!(
            addr = %self.addr,
            username = %welcome.canonical_username,
            "authenticated to accesspoint"
        );

        let routes: Routes = Arc::new(DashMap::new());
        let start = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        tokio::spawn(drive(
            transport,
            Arc::clone(&routes),
            Arc::clone(&start),
            cancel.clone(),
        ));

        self.link = Some(Link {
            username: welcome.canonical_username,
            stored_credentials: SecretString::from(welcome.reusable_auth_credentials),
            routes,
            start,
            cancel,
        });
        Ok(())
    }

    async fn login(&self, request: &LoginRequest) -> Result<(Transport, ApWelcome), Error> {
        debug!(addr = %self.addr, auth_type = ?request.auth_type, "connecting to accesspoint");

        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;

        let codec = codec::client_handshake(&mut stream).await?;
        let mut transport = Framed::new(stream, codec);
        debug!("accesspoint key exchange complete");

        transport
            .send(Packet::new(PacketType::Login, login::encode(request)?))
            .await?;

        loop {
            let packet = transport.next().await.ok_or(Error::ConnectionClosed)??;
            match packet.packet_type {
                PacketType::ApWelcome => {
                    let welcome: ApWelcome = login::decode(&packet.payload)?;
                    return Ok((transport, welcome));
                }
                PacketType::AuthFailure => {
                    let failed: ApLoginFailed = login::decode(&packet.payload)?;
                    return Err(Error::Authentication {
                        message: failed.describe(),
                    });
                }
                PacketType::Ping => {
                    transport
                        .send(Packet::new(PacketType::Pong, packet.payload))
                        .await?;
                }
                PacketType::Login => {
                    return Err(Error::UnexpectedPacket {
                        expected: "APWelcome",
                        got: packet.packet_type,
                    });
                }
                other => trace!(packet_type = ?other, "ignoring packet before welcome"),
            }
        }
    }

    /// Canonical username reported by the accesspoint.
    pub fn username(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.username.as_str())
    }

    /// Reusable credential (base64) issued on login.
    pub fn stored_credentials(&self) -> Option<&SecretString> {
        self.link.as_ref().map(|link| &link.stored_credentials)
    }

    /// Subscribe to packets of exactly `packet_type`.
    ///
    /// Only one live subscriber per type is allowed. Once the connection is
    /// closed the returned stream is already at its end.
    pub fn receive(&self, packet_type: PacketType) -> Result<mpsc::Receiver<Packet>, Error> {
        let link = self.link.as_ref().ok_or(Error::NotAuthenticated)?;
        let (tx, rx) = mpsc::channel(PACKET_CHANNEL_CAPACITY);

        if link.cancel.is_cancelled() {
            return Ok(rx);
        }

        match link.routes.entry(packet_type) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_closed() {
                    return Err(Error::AlreadySubscribed(packet_type));
                }
                entry.insert(tx);
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }

        // The task clears routes on exit; catch a close that raced the insert.
        if link.cancel.is_cancelled() {
            link.routes.remove(&packet_type);
        }

        link.start.notify_one();
        Ok(rx)
    }

    /// Tear down the connection and end every delivery stream.
    ///
    /// Safe to call any number of times, from any task.
    pub fn close(&self) {
        if let Some(link) = &self.link {
            if !link.cancel.is_cancelled() {
                debug!(addr = %self.addr, "closing accesspoint");
            }
            link.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.link
            .as_ref()
            .is_none_or(|link| link.cancel.is_cancelled())
    }
}

impl Drop for Accesspoint {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Background connection task ───────────────────────────────────────

async fn drive(
    mut transport: Transport,
    routes: Routes,
    start: Arc<Notify>,
    cancel: CancellationToken,
) {
    let started = tokio::select! {
        _ = cancel.cancelled() => false,
        () = start.notified() => true,
    };

    if started {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = transport.next() => match frame {
                    Some(Ok(packet)) => {
                        if packet.packet_type == PacketType::Ping {
                            let pong = Packet::new(PacketType::Pong, packet.payload.clone());
                            if let Err(e) = transport.send(pong).await {
                                warn!(error = %e, "failed answering accesspoint ping");
                                break;
                            }
                        }
                        dispatch(&routes, packet, &cancel).await;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "accesspoint connection failed");
                        break;
                    }
                    None => {
                        info!("accesspoint connection closed by peer");
                        break;
                    }
                },
            }
        }
    }

    if let Err(e) = transport.close().await {
        debug!(error = %e, "error while closing accesspoint transport");
    }
    // Cancel before clearing: `receive` re-checks the token after inserting.
    cancel.cancel();
    routes.clear();
    debug!("accesspoint connection task exiting");
}

async fn dispatch(routes: &Routes, packet: Packet, cancel: &CancellationToken) {
    let packet_type = packet.packet_type;
    let Some(tx) = routes.get(&packet_type).map(|entry| entry.value().clone()) else {
        trace!(?packet_type, "dropping packet with no subscriber");
        return;
    };

    tokio::select! {
        _ = cancel.cancelled() => {}
        sent = tx.send(packet) => {
            if sent.is_err() {
                routes.remove_if(&packet_type, |_, sender| sender.is_closed());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_addresses_without_port() {
        assert!(matches!(
            Accesspoint::new("ap.example.com", "dev"),
            Err(Error::InvalidAddress(_))
        ));
        assert!(matches!(
            Accesspoint::new(":4070", "dev"),
            Err(Error::InvalidAddress(_))
        ));
        assert!(Accesspoint::new("ap.example.com:4070", "dev").is_ok());
    }

    #[test]
    fn unauthenticated_accesspoint_has_no_identity() {
        let ap = Accesspoint::new("127.0.0.1:4070", "dev").unwrap();
        assert!(ap.username().is_none());
        assert!(ap.stored_credentials().is_none());
        assert!(matches!(
            ap.receive(PacketType::ProductInfo),
            Err(Error::NotAuthenticated)
        ));
        assert!(ap.is_closed());
        ap.close();
    }
}
