//! Configuration for the connectd daemon.
//!
//! TOML profiles, credential resolution (stored blob, env, keyring,
//! plaintext), and translation to `connectd_core::SessionConfig` plus the
//! endpoint resolver the session connects through. Nothing here writes to
//! disk; persisting a fresh stored credential is left to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use connectd_api::connect_state::DeviceType;
use connectd_api::{ApResolver, Resolver, StaticResolver, TransportConfig};
use connectd_core::config::{DEFAULT_CLIENT_ID, DEFAULT_DEVICE_NAME, DEFAULT_LOGIN5_URL};
use connectd_core::{CredentialSource, SessionConfig, derive_device_id};

const KEYRING_SERVICE: &str = "connectd";
pub const DEFAULT_APRESOLVE_URL: &str = "https://apresolve.spotify.com/";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed building resolver: {0}")]
    Resolver(#[from] connectd_api::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_apresolve_url")]
    pub apresolve_url: String,

    #[serde(default = "default_login5_url")]
    pub login5_url: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            apresolve_url: default_apresolve_url(),
            login5_url: default_login5_url(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_apresolve_url() -> String {
    DEFAULT_APRESOLVE_URL.into()
}
fn default_login5_url() -> String {
    DEFAULT_LOGIN5_URL.into()
}

/// A named device profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account username.
    pub username: Option<String>,

    /// Plaintext password; prefer the keyring or `password_env`.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Reusable credential (base64) from an earlier login. Wins over any password.
    pub stored_credentials: Option<String>,

    /// Name shown to other devices (defaults to "connectd").
    pub device_name: Option<String>,

    /// Hex device id (defaults to one derived from the device name).
    pub device_id: Option<String>,

    /// Device category, e.g. "speaker" or "computer".
    pub device_type: Option<String>,

    pub client_id: Option<String>,
    pub client_token: Option<String>,

    /// Fixed endpoints; set all three to bypass the resolve service.
    pub accesspoint: Option<String>,
    pub spclient: Option<String>,
    pub dealer: Option<String>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "connectd", "connectd").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("connectd");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `CONNECTD_*` environment
/// variables (`__` separates nesting, e.g. `CONNECTD_DEFAULTS__TIMEOUT`).
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CONNECTD_").split("__"))
}

/// Load the full Config from the file at `path` + environment.
/// A missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    Ok(figment_for(path).extract()?)
}

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_from(&config_path())
}

impl Config {
    /// Pick `requested`, else the configured default profile, else "default".
    ///
    /// A missing "default" profile is treated as empty so a config-less
    /// daemon can still run from environment variables alone.
    pub fn profile(&self, requested: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile.clone())),
            None if requested.is_none() => Ok((name, Profile::default())),
            None => Err(ConfigError::UnknownProfile { name }),
        }
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// First password found: env var, then keyring, then plaintext config.
pub fn pick_password(
    from_env: Option<String>,
    from_keyring: Option<String>,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    from_env
        .or(from_keyring)
        .or_else(|| plaintext.map(str::to_owned))
        .map(SecretString::from)
}

fn keyring_password(profile_name: &str) -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")).ok()?;
    entry.get_password().ok()
}

/// Resolve the `CredentialSource` for a profile.
///
/// A stored credential wins; otherwise the password chain is
/// `password_env` → keyring (`connectd`, `<profile>/password`) → plaintext.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<CredentialSource, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("CONNECTD_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;

    if let Some(ref blob) = profile.stored_credentials {
        debug!(profile = profile_name, "using stored credentials");
        return Ok(CredentialSource::StoredBlob {
            username,
            blob: SecretString::from(blob.clone()),
        });
    }

    let from_env = profile
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok());
    // Only consult the keyring when the environment came up empty.
    let from_keyring = if from_env.is_none() {
        keyring_password(profile_name)
    } else {
        None
    };

    pick_password(from_env, from_keyring, profile.password.as_deref())
        .map(|password| CredentialSource::UsernamePassword { username, password })
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build the runtime `SessionConfig` for a profile.
pub fn to_session_config(profile: &Profile, defaults: &Defaults) -> Result<SessionConfig, ConfigError> {
    let device_name = profile
        .device_name
        .clone()
        .unwrap_or_else(|| DEFAULT_DEVICE_NAME.into());
    let device_id = profile
        .device_id
        .clone()
        .unwrap_or_else(|| derive_device_id(&device_name));
    if device_id.is_empty() || !device_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::Validation {
            field: "device_id".into(),
            reason: format!("expected a hex string, got '{device_id}'"),
        });
    }

    let device_type = match profile.device_type.as_deref() {
        Some(raw) => DeviceType::from_str(raw).map_err(|_| ConfigError::Validation {
            field: "device_type".into(),
            reason: format!("unknown device type '{raw}'"),
        })?,
        None => DeviceType::default(),
    };

    Ok(SessionConfig {
        device_id,
        device_name,
        device_type,
        client_id: profile
            .client_id
            .clone()
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.into()),
        client_token: profile.client_token.clone().map(SecretString::from),
        login5_url: parse_url("login5_url", &defaults.login5_url)?,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
    })
}

/// Fixed endpoints when the profile names all three, else the resolve service.
pub fn build_resolver(
    profile: &Profile,
    defaults: &Defaults,
    transport: &TransportConfig,
) -> Result<Box<dyn Resolver>, ConfigError> {
    match (&profile.accesspoint, &profile.spclient, &profile.dealer) {
        (Some(accesspoint), Some(spclient), Some(dealer)) => Ok(Box::new(StaticResolver {
            accesspoint: accesspoint.clone(),
            spclient: spclient.clone(),
            dealer: dealer.clone(),
        })),
        (None, None, None) => {
            let url = parse_url("apresolve_url", &defaults.apresolve_url)?;
            Ok(Box::new(ApResolver::new(url, transport)?))
        }
        _ => Err(ConfigError::Validation {
            field: "accesspoint/spclient/dealer".into(),
            reason: "set all three endpoints or none".into(),
        }),
    }
}
