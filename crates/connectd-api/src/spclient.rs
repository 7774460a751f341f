// Spclient state publishing
//
// Only the connect-state PUT is implemented; the metadata endpoints of
// the real spclient are not part of this crate.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

pub const CONNECTION_ID_HEADER: &str = "X-Spotify-Connection-Id";

/// Authenticated spclient HTTP client.
pub struct Spclient {
    http: reqwest::Client,
    base_url: Url,
    access_token: SecretString,
    device_id: String,
    client_token: Option<SecretString>,
}

impl Spclient {
    pub fn new(
        base_url: Url,
        access_token: SecretString,
        device_id: &str,
        client_token: Option<SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self::with_client(
            transport.build_client()?,
            base_url,
            access_token,
            device_id,
            client_token,
        ))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        access_token: SecretString,
        device_id: &str,
        client_token: Option<SecretString>,
    ) -> Self {
        Self {
            http,
            base_url,
            access_token,
            device_id: device_id.to_owned(),
            client_token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `PUT /connect-state/v1/devices/{device_id}` for the given dealer connection.
    pub async fn put_connect_state<T: Serialize + ?Sized>(
        &self,
        connection_id: &str,
        request: &T,
    ) -> Result<(), Error> {
        let url = self
            .base_url
            .join(&format!("connect-state/v1/devices/{}", self.device_id))?;
        debug!(url = %url, connection_id, "putting connect state");

        let mut builder = self
            .http
            .put(url.clone())
            .bearer_auth(self.access_token.expose_secret())
            .header(CONNECTION_ID_HEADER, connection_id)
            .json(request);
        if let Some(token) = &self.client_token {
            builder = builder.header("client-token", token.expose_secret());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(%status, "connect state accepted");
        Ok(())
    }
}
