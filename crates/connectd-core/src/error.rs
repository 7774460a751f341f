// ── Core error types ──
//
// Connect failures carry the stage that failed so the caller can tell a
// resolver outage from a rejected password. In-loop errors are only ever
// logged by `Session::run`; they never end the loop.

use std::fmt;

use thiserror::Error;

/// The step of `Session::connect` that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    AccesspointResolve,
    AccesspointInit,
    AuthenticateUserPass,
    AuthenticateBlob,
    Login5,
    SpclientResolve,
    SpclientInit,
    DealerResolve,
    DealerConnect,
}

impl ConnectStage {
    pub fn message(self) -> &'static str {
        match self {
            Self::AccesspointResolve => "failed getting accesspoint from resolver",
            Self::AccesspointInit => "failed initializing accesspoint",
            Self::AuthenticateUserPass => {
                "failed authenticating accesspoint with username and password"
            }
            Self::AuthenticateBlob => "failed authenticating accesspoint with blob",
            Self::Login5 => "failed authenticating with login5",
            Self::SpclientResolve => "failed getting spclient from resolver",
            Self::SpclientInit => "failed initializing spclient",
            Self::DealerResolve => "failed getting dealer from resolver",
            Self::DealerConnect => "failed connecting to dealer",
        }
    }

    /// Stages where the backend judged our credentials.
    pub fn is_authentication(self) -> bool {
        matches!(
            self,
            Self::AuthenticateUserPass | Self::AuthenticateBlob | Self::Login5
        )
    }
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connect ──────────────────────────────────────────────────────
    #[error("{stage}: {source}")]
    Connect {
        stage: ConnectStage,
        source: connectd_api::Error,
    },

    // ── Event handling ───────────────────────────────────────────────
    #[error("failed unmarshalling ProductInfo: {0}")]
    ProductInfo(#[from] quick_xml::DeError),

    #[error("connection message carries no Spotify-Connection-Id header")]
    MissingConnectionId,

    #[error("failed initial state put: {0}")]
    PutState(#[source] connectd_api::Error),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("session is already running")]
    AlreadyRunning,

    #[error("{0} connection lost")]
    TransportLost(&'static str),

    #[error(transparent)]
    Api(#[from] connectd_api::Error),
}

impl CoreError {
    /// The connect stage that failed, if this is a connect error.
    pub fn stage(&self) -> Option<ConnectStage> {
        match self {
            Self::Connect { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns `true` if the backend rejected the credentials.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Connect { stage, source } => stage.is_authentication() && source.is_auth_failure(),
            Self::Api(e) | Self::PutState(e) => e.is_auth_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_leads_with_stage_message() {
        let err = CoreError::Connect {
            stage: ConnectStage::AuthenticateBlob,
            source: connectd_api::Error::Authentication {
                message: "BAD_CREDENTIALS".into(),
            },
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("failed authenticating accesspoint with blob: "));
        assert!(rendered.contains("BAD_CREDENTIALS"));
        assert_eq!(err.stage(), Some(ConnectStage::AuthenticateBlob));
        assert!(err.is_auth_failure());
    }

    #[test]
    fn resolver_failure_is_not_auth_failure() {
        let err = CoreError::Connect {
            stage: ConnectStage::DealerResolve,
            source: connectd_api::Error::NoEndpoint { kind: "dealer" },
        };
        assert!(!err.is_auth_failure());
        assert_eq!(err.to_string(), "failed getting dealer from resolver: Resolver returned no dealer endpoints");
    }
}
