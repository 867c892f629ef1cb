//! Seam between the orchestrator and the SSH library.
//!
//! [`Transport`] opens one authenticated session to one host, either over a
//! fresh TCP connection or over a stream that already exists (the second leg
//! of a bastion chain). Sessions hand out forwarded byte streams and shell
//! channels. The russh implementation lives in [`crate::ssh::client`].

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::models::connection::TransportOptions;
use crate::models::error::Result;

/// Bidirectional byte stream usable as an SSH transport or a forwarded channel
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Fully resolved parameters for one connect attempt
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
    /// Agent used for authentication, and for forwarding when `agent_forward` is set
    pub agent_socket: Option<String>,
    pub agent_forward: bool,
    pub transport: TransportOptions,
}

impl ConnectParams {
    /// Same credentials, different destination
    pub fn with_destination(&self, host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("agent_socket", &self.agent_socket)
            .field("agent_forward", &self.agent_forward)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Something that arrived on a shell channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Session: TransportSession;

    /// Open and authenticate a session. With `tunnel` set the handshake runs
    /// over that stream instead of a new TCP connection.
    async fn connect(&self, params: &ConnectParams, tunnel: Option<BoxedStream>) -> Result<Self::Session>;
}

#[async_trait]
pub trait TransportSession: Send + Sync + 'static {
    type Shell: ShellChannel;

    /// Open a direct-tcpip channel from `bind_addr:bind_port` to `dest_host:dest_port`
    async fn open_forwarded_channel(
        &self,
        bind_addr: &str,
        bind_port: u16,
        dest_host: &str,
        dest_port: u16,
    ) -> Result<BoxedStream>;

    /// Open a shell channel; `interactive` also allocates a PTY
    async fn open_shell(&self, interactive: bool) -> Result<Self::Shell>;

    /// Close the session. Never fails.
    async fn end(&self);
}

#[async_trait]
pub trait ShellChannel: Send + 'static {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Send EOF on the write side
    async fn close_write(&mut self) -> Result<()>;

    /// Next event, or `None` once the channel is closed. Cancel safe.
    async fn next_event(&mut self) -> Option<ShellEvent>;
}
