use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum SshError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Connection failed to {0}: {1}")]
    ConnectionFailed(String, String),

    #[error("Failed to open forwarded channel to {host}:{port}: {reason}")]
    ChannelOpenFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Remote stream error: {0}")]
    RemoteStream(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Host key verification failed for {hostname}: {reason}")]
    HostKeyVerificationFailed { hostname: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SshError {
    /// Check if this error can be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SshError::ConnectionFailed(_, _) | SshError::ChannelOpenFailed { .. }
        )
    }

    /// Get a suggestion for recovering from this error
    pub fn recovery_suggestion(&self) -> &str {
        match self {
            SshError::InvalidConfiguration(_) => "Review the connection options",
            SshError::ConnectionFailed(_, _) => "Check network connectivity and SSH credentials, then try again",
            SshError::ChannelOpenFailed { .. } => {
                "Check that the destination is reachable from the remote host"
            }
            SshError::RemoteStream(_) => "Inspect the remote command output",
            SshError::CredentialError(_) => "Check the private key and passphrase",
            SshError::HostKeyVerificationFailed { .. } => {
                "Verify the host key and update ~/.ssh/known_hosts"
            }
            SshError::Io(_) => "Check local sockets and terminal",
            SshError::InvalidOperation { .. } => "This operation is not allowed",
            SshError::Internal(_) => "Retry the operation",
        }
    }
}

impl From<std::io::Error> for SshError {
    fn from(e: std::io::Error) -> Self {
        SshError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SshError>;
