// ── Session ──
//
// Connects the accesspoint, Login5, spclient and dealer in dependency order,
// then runs a single event loop over accesspoint packets and dealer messages
// until the session is closed.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use connectd_api::connect_state::PutStateReason;
use connectd_api::resolver::endpoint_url;
use connectd_api::{
    AccessToken, Accesspoint, Dealer, Login5, Message, Packet, PacketType, Resolver, Spclient,
    TransportConfig,
};

use crate::config::SessionConfig;
use crate::credentials::CredentialSource;
use crate::device::DeviceDescriptor;
use crate::error::{ConnectStage, CoreError};
use crate::product_info::ProductInfo;

pub const PUSHER_CONNECTIONS_PREFIX: &str = "hm://pusher/v1/connections/";
pub const CONNECT_STATE_PREFIX: &str = "hm://connect-state/v1/";
const VOLUME_PREFIX: &str = "hm://connect-state/v1/connect/volume";
const LOGOUT_PREFIX: &str = "hm://connect-state/v1/connect/logout";
const CLUSTER_PREFIX: &str = "hm://connect-state/v1/cluster";

/// Header carrying the dealer connection id on pusher messages.
const DEALER_CONNECTION_ID_HEADER: &str = "Spotify-Connection-Id";

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Running,
    Closed,
}

// ── Routing ──────────────────────────────────────────────────────────

/// What a dealer message asks the session to do, by uri prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PusherConnection,
    Volume,
    Logout,
    Cluster,
    Ignored,
}

impl Route {
    pub fn classify(uri: &str) -> Self {
        if uri.starts_with(PUSHER_CONNECTIONS_PREFIX) {
            Self::PusherConnection
        } else if uri.starts_with(VOLUME_PREFIX) {
            Self::Volume
        } else if uri.starts_with(LOGOUT_PREFIX) {
            Self::Logout
        } else if uri.starts_with(CLUSTER_PREFIX) {
            Self::Cluster
        } else {
            Self::Ignored
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// A connected device session.
///
/// Only [`connect`](Self::connect) creates one, so holding a `Session`
/// means every collaborator is up. Share it behind an `Arc` to call
/// [`close`](Self::close) from another task while [`run`](Self::run) is
/// active.
pub struct Session {
    device: DeviceDescriptor,
    ap: Accesspoint,
    login5: Login5,
    spclient: Spclient,
    dealer: Dealer,
    connection_id: ArcSwapOption<String>,
    stop_tx: mpsc::Sender<()>,
    stop_rx: Mutex<Option<mpsc::Receiver<()>>>,
    state: watch::Sender<SessionState>,
}

fn at(stage: ConnectStage) -> impl FnOnce(connectd_api::Error) -> CoreError {
    move |source| CoreError::Connect { stage, source }
}

impl Session {
    /// Bring up every collaborator, in order, failing fast.
    ///
    /// On error everything opened so far is torn down and no session is
    /// returned.
    pub async fn connect(
        config: &SessionConfig,
        resolver: &dyn Resolver,
        credentials: &CredentialSource,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.timeout);

        let mut login5 = Login5::new(
            config.login5_url.clone(),
            &config.device_id,
            &config.client_id,
            config.client_token.clone(),
            &transport,
        )
        .map_err(at(ConnectStage::Login5))?;

        // ── Accesspoint ──
        let ap_addr = resolver
            .accesspoint()
            .await
            .map_err(at(ConnectStage::AccesspointResolve))?;
        let mut ap = Accesspoint::new(&ap_addr, &config.device_id)
            .map_err(at(ConnectStage::AccesspointInit))?
            .with_timeout(config.timeout);

        debug!(addr = %ap_addr, kind = credentials.kind(), "authenticating to accesspoint");
        match credentials {
            CredentialSource::UsernamePassword { username, password } => ap
                .connect_user_pass(username, password)
                .await
                .map_err(at(ConnectStage::AuthenticateUserPass))?,
            CredentialSource::StoredBlob { username, blob } => ap
                .connect_blob(username, blob)
                .await
                .map_err(at(ConnectStage::AuthenticateBlob))?,
        }

        // ── Login5 ──
        let (username, stored) = match (ap.username(), ap.stored_credentials()) {
            (Some(username), Some(stored)) => (username.to_owned(), stored.clone()),
            _ => return Err(at(ConnectStage::Login5)(connectd_api::Error::NotAuthenticated)),
        };
        login5
            .login(&username, &stored)
            .await
            .map_err(at(ConnectStage::Login5))?;
        let token = login5
            .access_token()
            .map(|token| token.token.clone())
            .ok_or_else(|| at(ConnectStage::Login5)(connectd_api::Error::NotAuthenticated))?;

        // ── Spclient ──
        let sp_addr = resolver
            .spclient()
            .await
            .map_err(at(ConnectStage::SpclientResolve))?;
        let spclient = endpoint_url(&sp_addr, "https")
            .and_then(|url| {
                Spclient::new(
                    url,
                    token.clone(),
                    &config.device_id,
                    config.client_token.clone(),
                    &transport,
                )
            })
            .map_err(at(ConnectStage::SpclientInit))?;

        // ── Dealer ──
        let dealer_addr = resolver
            .dealer()
            .await
            .map_err(at(ConnectStage::DealerResolve))?;
        let dealer_url =
            endpoint_url(&dealer_addr, "wss").map_err(at(ConnectStage::DealerConnect))?;
        let dealer = Dealer::connect(&dealer_url, &token)
            .await
            .map_err(at(ConnectStage::DealerConnect))?;

        info!(username = %username, device_id = %config.device_id, "session connected");

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(SessionState::Connected);

        Ok(Self {
            device: DeviceDescriptor::from_config(config),
            ap,
            login5,
            spclient,
            dealer,
            connection_id: ArcSwapOption::empty(),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
            state,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Canonical username reported by the accesspoint.
    pub fn username(&self) -> &str {
        self.ap.username().unwrap_or_default()
    }

    /// Reusable credential, for an external persistence layer.
    pub fn stored_credentials(&self) -> Option<&SecretString> {
        self.ap.stored_credentials()
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.login5.access_token()
    }

    /// Dealer connection id, once the backend has assigned one.
    pub fn connection_id(&self) -> Option<Arc<String>> {
        self.connection_id.load_full()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Process events until the session is closed.
    ///
    /// Returns `Ok` after [`close`](Self::close), and
    /// [`CoreError::TransportLost`] if either connection ends on its own.
    /// Errors from individual events are logged and never end the loop.
    pub async fn run(&self) -> Result<(), CoreError> {
        let mut stop = self
            .stop_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CoreError::AlreadyRunning)?;

        let mut packets = self.ap.receive(PacketType::ProductInfo)?;
        let mut messages = self
            .dealer
            .receive_message(&[PUSHER_CONNECTIONS_PREFIX, CONNECT_STATE_PREFIX]);

        self.state.send_if_modified(|state| {
            let connected = *state == SessionState::Connected;
            if connected {
                *state = SessionState::Running;
            }
            connected
        });
        debug!("session running");

        loop {
            // A handler may have closed the session; nothing runs after that.
            if stop.try_recv().is_ok() {
                break;
            }

            tokio::select! {
                _ = stop.recv() => break,
                packet = packets.recv() => match packet {
                    Some(packet) => {
                        if let Err(e) = Self::handle_accesspoint_packet(&packet) {
                            warn!(error = %e, "failed handling accesspoint packet");
                        }
                    }
                    None => return Self::ended(&mut stop, "accesspoint"),
                },
                message = messages.recv() => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_dealer_message(&message).await {
                            warn!(error = %e, uri = %message.uri, "failed handling dealer message");
                        }
                    }
                    None => return Self::ended(&mut stop, "dealer"),
                },
            }
        }

        debug!("session loop stopped");
        Ok(())
    }

    /// A delivery stream ended: fine if we are shutting down, fatal otherwise.
    fn ended(stop: &mut mpsc::Receiver<()>, transport: &'static str) -> Result<(), CoreError> {
        if stop.try_recv().is_ok() {
            Ok(())
        } else {
            warn!(transport, "connection lost");
            Err(CoreError::TransportLost(transport))
        }
    }

    /// Stop [`run`](Self::run) and tear down the dealer, then the accesspoint.
    ///
    /// Never blocks. Safe to call repeatedly, concurrently, or from inside
    /// an event handler.
    pub fn close(&self) {
        // A full slot means a stop is already pending.
        let _ = self.stop_tx.try_send(());
        self.dealer.close();
        self.ap.close();
        if self.state.send_replace(SessionState::Closed) != SessionState::Closed {
            info!("session closed");
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────

    fn handle_accesspoint_packet(packet: &Packet) -> Result<(), CoreError> {
        match packet.packet_type {
            PacketType::ProductInfo => {
                let info = ProductInfo::parse(&packet.payload)?;
                debug!(products = info.products.len(), "received product info");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn handle_dealer_message(&self, message: &Message) -> Result<(), CoreError> {
        match Route::classify(&message.uri) {
            Route::PusherConnection => {
                let connection_id = message
                    .header(DEALER_CONNECTION_ID_HEADER)
                    .ok_or(CoreError::MissingConnectionId)?;
                self.connection_id
                    .store(Some(Arc::new(connection_id.to_owned())));
                debug!(connection_id, "received connection id");

                let request = self.device.put_state_request(
                    PutStateReason::NewDevice,
                    false,
                    now_millis(),
                );
                self.spclient
                    .put_connect_state(connection_id, &request)
                    .await
                    .map_err(CoreError::PutState)?;
                info!(connection_id, "announced device state");
                Ok(())
            }
            Route::Logout => {
                info!("logging out from {}", self.username());
                self.close();
                Ok(())
            }
            // Volume sync and takeover detection are not implemented.
            Route::Volume | Route::Cluster | Route::Ignored => Ok(()),
        }
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
