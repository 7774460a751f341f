// ── Runtime session configuration ──
//
// Describes the device and the backend collaborators a session talks to.
// Built by the outer layer (config crate / binary) and handed in; core
// never reads config files.

use std::time::Duration;

use secrecy::SecretString;
use sha2::{Digest, Sha256};
use url::Url;

use connectd_api::connect_state::DeviceType;

/// Client id registered for this software.
pub const DEFAULT_CLIENT_ID: &str = "65b708073fc0480ea92a077233ca87bd";
pub const DEFAULT_LOGIN5_URL: &str = "https://login5.spotify.com/";
pub const DEFAULT_DEVICE_NAME: &str = "connectd";

const DEVICE_ID_BYTES: usize = 20;

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stable device identifier (hex).
    pub device_id: String,
    /// Name shown to other devices on the account.
    pub device_name: String,
    pub device_type: DeviceType,
    pub client_id: String,
    /// Optional `client-token` presented to Login5 and spclient.
    pub client_token: Option<SecretString>,
    pub login5_url: Url,
    /// Bound for the accesspoint handshake and every HTTP request.
    pub timeout: Duration,
}

impl SessionConfig {
    /// Defaults for a device named `device_name`, with an id derived from it.
    pub fn for_device(device_name: &str) -> Self {
        Self {
            device_id: derive_device_id(device_name),
            device_name: device_name.to_owned(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_id: derive_device_id(DEFAULT_DEVICE_NAME),
            device_name: DEFAULT_DEVICE_NAME.to_owned(),
            device_type: DeviceType::Speaker,
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            client_token: None,
            login5_url: default_login5_url(),
            timeout: Duration::from_secs(30),
        }
    }
}

fn default_login5_url() -> Url {
    Url::parse(DEFAULT_LOGIN5_URL).unwrap_or_else(|_| unreachable!("constant URL parses"))
}

/// Stable hex device id: the first 20 bytes of SHA-256 over the name.
pub fn derive_device_id(device_name: &str) -> String {
    let digest = Sha256::digest(device_name.as_bytes());
    digest
        .iter()
        .take(DEVICE_ID_BYTES)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
