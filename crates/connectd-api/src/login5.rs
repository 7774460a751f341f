// Login5 token exchange
//
// Trades the stored credential obtained from the accesspoint for a
// short-lived bearer token. The token is captured once; nothing here
// refreshes it.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Bearer token issued by Login5.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    client_info: ClientInfo<'a>,
    stored_credential: StoredCredential<'a>,
}

#[derive(Debug, Serialize)]
struct ClientInfo<'a> {
    client_id: &'a str,
    device_id: &'a str,
}

#[derive(Debug, Serialize)]
struct StoredCredential<'a> {
    username: &'a str,
    /// Base64 stored credential.
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    ok: Option<LoginOk>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    challenges: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LoginOk {
    username: String,
    access_token: String,
    access_token_expires_in: i64,
}

// ── Client ───────────────────────────────────────────────────────────

/// Login5 HTTP client.
pub struct Login5 {
    http: reqwest::Client,
    base_url: Url,
    device_id: String,
    client_id: String,
    client_token: Option<SecretString>,
    token: Option<AccessToken>,
}

impl Login5 {
    pub fn new(
        base_url: Url,
        device_id: &str,
        client_id: &str,
        client_token: Option<SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self::with_client(
            transport.build_client()?,
            base_url,
            device_id,
            client_id,
            client_token,
        ))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        device_id: &str,
        client_id: &str,
        client_token: Option<SecretString>,
    ) -> Self {
        Self {
            http,
            base_url,
            device_id: device_id.to_owned(),
            client_id: client_id.to_owned(),
            client_token,
            token: None,
        }
    }

    /// Exchange `stored_credential` (base64) for an access token.
    pub async fn login(
        &mut self,
        username: &str,
        stored_credential: &SecretString,
    ) -> Result<(), Error> {
        let url = self.base_url.join("v3/login")?;
        debug!(url = %url, "logging in with login5");

        let body = LoginRequest {
            client_info: ClientInfo {
                client_id: &self.client_id,
                device_id: &self.device_id,
            },
            stored_credential: StoredCredential {
                username,
                data: stored_credential.expose_secret(),
            },
        };

        let mut request = self.http.post(url.clone()).json(&body);
        if let Some(token) = &self.client_token {
            request = request.header("client-token", token.expose_secret());
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: LoginResponse =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?;

        if let Some(code) = parsed.error {
            return Err(Error::Login5Rejected { message: code });
        }
        if parsed.challenges.is_some() {
            return Err(Error::Login5Rejected {
                message: "login challenge not supported".into(),
            });
        }
        let ok = parsed.ok.ok_or_else(|| Error::Deserialization {
            message: "login5 response carries neither ok nor error".into(),
            body: text.clone(),
        })?;

        let expires_at = TimeDelta::try_seconds(ok.access_token_expires_in)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| Error::Deserialization {
                message: "access_token_expires_in out of range".into(),
                body: text.clone(),
            })?;
        debug!(username = %ok.username, %expires_at, "login5 token acquired");

        self.token = Some(AccessToken {
            token: SecretString::from(ok.access_token),
            username: ok.username,
            expires_at,
        });
        Ok(())
    }

    /// The token from the last successful [`login`](Self::login).
    pub fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }
}
