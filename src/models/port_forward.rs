use serde::{Deserialize, Serialize};

/// Destination host used when a rule does not name one
pub const DEFAULT_FORWARD_HOST: &str = "localhost";

fn default_to_host() -> String {
    DEFAULT_FORWARD_HOST.to_string()
}

/// A local-port-to-remote-host forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingRule {
    /// Loopback port to listen on (0 picks an ephemeral port)
    pub from_port: u16,
    /// Host to connect to, as seen from the remote end of the session
    #[serde(default = "default_to_host")]
    pub to_host: String,
    /// Port to connect to on `to_host`
    pub to_port: u16,
}

impl ForwardingRule {
    pub fn new(from_port: u16, to_host: Option<String>, to_port: u16) -> Self {
        Self {
            from_port,
            to_host: to_host.unwrap_or_else(default_to_host),
            to_port,
        }
    }
}
