//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` and `CoreError` into user-facing errors with help text
//! and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use connectd_config::ConfigError;
use connectd_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration")]
    #[diagnostic(
        code(connectd::config),
        help("Check {path} or the CONNECTD_* environment variables.")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(connectd::no_credentials),
        help(
            "Set username plus one of stored_credentials, password_env or password \
             in the profile, or store the password in the system keyring under \
             service 'connectd', user '{profile}/password'."
        )
    )]
    NoCredentials { profile: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(connectd::auth_failed),
        help("The backend rejected the credentials for profile '{profile}'.")
    )]
    AuthFailed {
        profile: String,
        #[source]
        source: CoreError,
    },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not establish the device session")]
    #[diagnostic(
        code(connectd::connection_failed),
        help("Check network access to the backend, or configure fixed endpoints in the profile.")
    )]
    ConnectionFailed {
        #[source]
        source: CoreError,
    },

    #[error("Session ended unexpectedly")]
    #[diagnostic(code(connectd::connection_lost))]
    ConnectionLost {
        #[source]
        source: CoreError,
    },

    // ── Other ────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(connectd::core))]
    Core(CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => exit_code::CONFIG,
            Self::NoCredentials { .. } | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } | Self::ConnectionLost { .. } => exit_code::CONNECTION,
            Self::Core(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }

    pub fn from_config(err: ConfigError, path: &std::path::Path) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            source => Self::Config {
                path: path.display().to_string(),
                source,
            },
        }
    }

    pub fn from_core(err: CoreError, profile: &str) -> Self {
        if err.is_auth_failure() {
            return Self::AuthFailed {
                profile: profile.to_owned(),
                source: err,
            };
        }
        match err {
            CoreError::Connect { .. } => Self::ConnectionFailed { source: err },
            CoreError::TransportLost(_) => Self::ConnectionLost { source: err },
            other => Self::Core(other),
        }
    }
}
