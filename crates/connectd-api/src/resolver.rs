//! Backend endpoint resolution.
//!
//! The session asks a [`Resolver`] for one address per service while it
//! connects. [`ApResolver`] queries the HTTP resolve service once and
//! caches the answer; [`StaticResolver`] hands out fixed addresses.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<String, Error>> + Send + 'a>>;

/// Source of backend addresses (`host:port`, or a full URL).
pub trait Resolver: Send + Sync {
    fn accesspoint(&self) -> ResolveFuture<'_>;
    fn spclient(&self) -> ResolveFuture<'_>;
    fn dealer(&self) -> ResolveFuture<'_>;
}

/// Turn a resolved address into a URL, adding `default_scheme` when the
/// address is a bare `host:port`.
pub fn endpoint_url(addr: &str, default_scheme: &str) -> Result<Url, Error> {
    let mut url = if addr.contains("://") {
        Url::parse(addr)?
    } else {
        Url::parse(&format!("{default_scheme}://{addr}/"))?
    };
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// ── Static ───────────────────────────────────────────────────────────

/// Fixed addresses, e.g. from configuration.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    pub accesspoint: String,
    pub spclient: String,
    pub dealer: String,
}

impl Resolver for StaticResolver {
    fn accesspoint(&self) -> ResolveFuture<'_> {
        let addr = self.accesspoint.clone();
        Box::pin(async move { Ok(addr) })
    }

    fn spclient(&self) -> ResolveFuture<'_> {
        let addr = self.spclient.clone();
        Box::pin(async move { Ok(addr) })
    }

    fn dealer(&self) -> ResolveFuture<'_> {
        let addr = self.dealer.clone();
        Box::pin(async move { Ok(addr) })
    }
}

// ── HTTP resolve service ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
struct Endpoints {
    #[serde(default)]
    accesspoint: Vec<String>,
    #[serde(default)]
    dealer: Vec<String>,
    #[serde(default)]
    spclient: Vec<String>,
}

/// Resolver backed by the `apresolve` HTTP service.
pub struct ApResolver {
    http: reqwest::Client,
    base_url: Url,
    endpoints: OnceCell<Endpoints>,
}

impl ApResolver {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            endpoints: OnceCell::new(),
        }
    }

    async fn endpoints(&self) -> Result<&Endpoints, Error> {
        self.endpoints.get_or_try_init(|| self.fetch()).await
    }

    async fn fetch(&self) -> Result<Endpoints, Error> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("type", "accesspoint")
            .append_pair("type", "dealer")
            .append_pair("type", "spclient");
        debug!(url = %url, "resolving backend endpoints");

        let resp = self.http.get(url.clone()).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text,
        })
    }

    async fn first(&self, kind: &'static str) -> Result<String, Error> {
        let endpoints = self.endpoints().await?;
        let list = match kind {
            "accesspoint" => &endpoints.accesspoint,
            "dealer" => &endpoints.dealer,
            _ => &endpoints.spclient,
        };
        list.first().cloned().ok_or(Error::NoEndpoint { kind })
    }
}

impl Resolver for ApResolver {
    fn accesspoint(&self) -> ResolveFuture<'_> {
        Box::pin(self.first("accesspoint"))
    }

    fn spclient(&self) -> ResolveFuture<'_> {
        Box::pin(self.first("spclient"))
    }

    fn dealer(&self) -> ResolveFuture<'_> {
        Box::pin(self.first("dealer"))
    }
}
