// ── Session credentials ──
//
// The two ways a session can authenticate to the accesspoint. Both yield
// the same (username, stored credential) pair on success.

use secrecy::SecretString;

/// Credentials supplied once, at session start.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Interactive username and password.
    UsernamePassword {
        username: String,
        password: SecretString,
    },
    /// Reusable credential (base64) issued by an earlier login.
    StoredBlob { username: String, blob: SecretString },
}

impl CredentialSource {
    pub fn username(&self) -> &str {
        match self {
            Self::UsernamePassword { username, .. } | Self::StoredBlob { username, .. } => username,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UsernamePassword { .. } => "password",
            Self::StoredBlob { .. } => "stored",
        }
    }
}
