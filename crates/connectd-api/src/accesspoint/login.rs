// Accesspoint login exchange
//
// Bodies of the `Login`, `APWelcome` and `AuthFailure` packets. Secret
// material travels base64-encoded inside the JSON document.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How the `auth_data` field of a login request should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationType {
    #[serde(rename = "AUTHENTICATION_USER_PASS")]
    UserPass,
    #[serde(rename = "AUTHENTICATION_STORED_SPOTIFY_CREDENTIALS")]
    StoredCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub cpu_family: String,
    pub system_information_string: String,
    pub device_id: String,
}

impl SystemInfo {
    pub fn for_device(device_id: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            cpu_family: std::env::consts::ARCH.to_owned(),
            system_information_string: crate::VERSION_STRING.to_owned(),
            device_id: device_id.to_owned(),
        }
    }
}

/// Body of the `Login` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub auth_type: AuthenticationType,
    /// Base64 of the password or stored credential.
    pub auth_data: String,
    pub device_id: String,
    pub system_info: SystemInfo,
    pub version_string: String,
}

impl LoginRequest {
    pub fn user_pass(username: &str, password: &SecretString, device_id: &str) -> Self {
        Self::new(
            username,
            AuthenticationType::UserPass,
            STANDARD.encode(password.expose_secret().as_bytes()),
            device_id,
        )
    }

    /// `blob` is already base64, the form in which stored credentials are kept.
    pub fn stored(username: &str, blob: &SecretString, device_id: &str) -> Self {
        Self::new(
            username,
            AuthenticationType::StoredCredentials,
            blob.expose_secret().to_owned(),
            device_id,
        )
    }

    fn new(username: &str, auth_type: AuthenticationType, auth_data: String, device_id: &str) -> Self {
        Self {
            username: username.to_owned(),
            auth_type,
            auth_data,
            device_id: device_id.to_owned(),
            system_info: SystemInfo::for_device(device_id),
            version_string: crate::VERSION_STRING.to_owned(),
        }
    }

    /// Decode `auth_data` back into raw bytes.
    pub fn auth_bytes(&self) -> Result<Vec<u8>, Error> {
        STANDARD
            .decode(&self.auth_data)
            .map_err(|e| Error::Deserialization {
                message: format!("auth_data is not base64: {e}"),
                body: String::new(),
            })
    }
}

/// Body of the `APWelcome` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApWelcome {
    pub canonical_username: String,
    pub reusable_auth_credentials_type: AuthenticationType,
    /// Base64 of the reusable credential.
    pub reusable_auth_credentials: String,
}

/// Body of the `AuthFailure` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApLoginFailed {
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ApLoginFailed {
    pub fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{}: {desc}", self.error_code),
            None => self.error_code.clone(),
        }
    }
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(payload).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::from_utf8_lossy(payload).into_owned(),
    })
}

pub(crate) fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn user_pass_request_encodes_password_as_base64() {
        let request = LoginRequest::user_pass("alice", &SecretString::from("secret".to_owned()), "dev1");

        assert_eq!(request.auth_type, AuthenticationType::UserPass);
        assert_eq!(request.auth_bytes().unwrap(), b"secret");
        assert_eq!(request.system_info.device_id, "dev1");
    }

    #[test]
    fn stored_request_passes_blob_through() {
        let request = LoginRequest::stored("alice", &SecretString::from("YmxvYg==".to_owned()), "dev1");

        assert_eq!(request.auth_type, AuthenticationType::StoredCredentials);
        assert_eq!(request.auth_data, "YmxvYg==");
        assert_eq!(request.auth_bytes().unwrap(), b"blob");
    }

    #[test]
    fn auth_type_uses_protocol_names() {
        let json = serde_json::to_value(AuthenticationType::StoredCredentials).unwrap();
        assert_eq!(json, "AUTHENTICATION_STORED_SPOTIFY_CREDENTIALS");
    }

    #[test]
    fn failure_description_includes_code() {
        let failed: ApLoginFailed =
            decode(br#"{"error_code":"BadCredentials","error_description":"nope"}"#).unwrap();
        assert_eq!(failed.describe(), "BadCredentials: nope");
    }
}
