use serde::{Deserialize, Serialize};

/// Port used when the target port is not set, and always for the bastion
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How server host keys are checked against ~/.ssh/known_hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostKeyPolicy {
    /// Accept every host key without consulting known_hosts
    AcceptAny,
    /// Accept and record unknown hosts, reject changed or revoked keys
    #[default]
    AcceptNew,
    /// Only accept hosts already present in known_hosts
    Strict,
}

/// Transport-level settings passed through to the SSH library untouched
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportOptions {
    /// Password, tried after key and agent authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout_secs: Option<u64>,
    pub host_key_policy: HostKeyPolicy,
}

impl std::fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TransportOptions")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("keepalive_interval_secs", &self.keepalive_interval_secs)
            .field("inactivity_timeout_secs", &self.inactivity_timeout_secs)
            .field("host_key_policy", &self.host_key_policy)
            .finish()
    }
}

/// Caller-supplied connection configuration.
///
/// Only `end_host` is required. Username, port and private key are filled in
/// from the environment when the orchestrator is built.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    /// Target host
    pub end_host: String,
    /// Target port, 22 when unset
    #[serde(alias = "port", skip_serializing_if = "Option::is_none")]
    pub end_port: Option<u16>,
    /// Intermediate host the target is reached through (always on port 22)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bastion_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Private key text (OpenSSH or PEM)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Authenticate through, and forward, the local SSH agent
    pub agent_forward: bool,
    /// Explicit agent socket (or named pipe) path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_socket: Option<String>,
    /// Do not load ~/.ssh/id_rsa when no key was given
    pub skip_auto_private_key: bool,
    /// Never prompt on the terminal for a key passphrase
    pub no_passphrase_prompt: bool,
    pub transport: TransportOptions,
}

impl ConnectionOptions {
    pub fn new(end_host: impl Into<String>) -> Self {
        Self {
            end_host: end_host.into(),
            ..Default::default()
        }
    }

    /// Alias of `end_port` with the default applied
    pub fn port(&self) -> u16 {
        self.end_port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("end_host", &self.end_host)
            .field("end_port", &self.end_port)
            .field("bastion_host", &self.bastion_host)
            .field("username", &self.username)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("agent_forward", &self.agent_forward)
            .field("agent_socket", &self.agent_socket)
            .field("skip_auto_private_key", &self.skip_auto_private_key)
            .field("no_passphrase_prompt", &self.no_passphrase_prompt)
            .field("transport", &self.transport)
            .finish()
    }
}
