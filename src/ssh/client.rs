use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::key;
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::decode_secret_key;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::connection::{HostKeyPolicy, TransportOptions};
use crate::models::error::{Result, SshError};
use crate::ssh::agent;
use crate::ssh::known_hosts::{self, HostKeyRejection};
use crate::ssh::transport::{
    BoxedStream, ConnectParams, ShellChannel, ShellEvent, Transport, TransportSession,
};

/// Format a host:port pair, bracketing IPv6 addresses to avoid ambiguity.
fn host_port(hostname: &str, port: u16) -> String {
    if hostname.contains(':') {
        format!("[{}]:{}", hostname, port)
    } else {
        format!("{}:{}", hostname, port)
    }
}

/// Handle to observe host key rejections after the SSH handshake.
/// russh takes ownership of `SshHandler`, so the rejection is shared through
/// `Arc<Mutex<>>` and inspected by the caller when the connect fails.
pub struct HostKeyWatcher(Arc<Mutex<Option<HostKeyRejection>>>);

impl HostKeyWatcher {
    /// If a host key rejection was recorded, convert it to an `SshError`.
    pub fn check(&self, hostname: &str, port: u16) -> Option<SshError> {
        let reason = self.0.lock().ok()?.take()?;
        Some(reason.into_error(hostname, port))
    }
}

/// SSH connection handler: host key verification and agent forwarding.
pub struct SshHandler {
    hostname: String,
    port: u16,
    policy: HostKeyPolicy,
    /// Local agent to relay server-opened agent channels to
    forward_agent_to: Option<String>,
    rejection: Arc<Mutex<Option<HostKeyRejection>>>,
}

impl SshHandler {
    pub fn new(
        hostname: String,
        port: u16,
        policy: HostKeyPolicy,
        forward_agent_to: Option<String>,
    ) -> (Self, HostKeyWatcher) {
        let rejection = Arc::new(Mutex::new(None));
        let watcher = HostKeyWatcher(rejection.clone());
        (
            Self {
                hostname,
                port,
                policy,
                forward_agent_to,
                rejection,
            },
            watcher,
        )
    }
}

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match known_hosts::verify_host_key(self.policy, &self.hostname, self.port, server_public_key) {
            Ok(()) => Ok(true),
            Err(rejection) => {
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(rejection);
                }
                Ok(false)
            }
        }
    }

    async fn server_channel_open_agent_forward(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        match &self.forward_agent_to {
            Some(socket) => {
                tracing::debug!("Agent forwarding channel opened by {}", self.hostname);
                tokio::spawn(agent::relay_agent_channel(channel, socket.clone()));
            }
            None => {
                tracing::warn!(
                    "{} opened an agent channel but forwarding is disabled",
                    self.hostname
                );
            }
        }
        Ok(())
    }
}

fn build_config(options: &TransportOptions) -> Config {
    let mut config = Config::default();
    if let Some(secs) = options.keepalive_interval_secs {
        config.keepalive_interval = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = options.inactivity_timeout_secs {
        config.inactivity_timeout = Some(Duration::from_secs(secs));
    }
    config
}

/// Transport backed by russh
#[derive(Debug, Default, Clone, Copy)]
pub struct RusshTransport;

impl RusshTransport {
    pub fn new() -> Self {
        Self
    }

    /// Authenticate with the SSH server: private key, then agent, then password.
    async fn authenticate(session: &mut Handle<SshHandler>, params: &ConnectParams) -> Result<()> {
        let host = &params.host;
        let mut attempted = Vec::new();

        if let Some(key_content) = &params.private_key {
            attempted.push("publickey");
            // An encrypted key without passphrase ends here; it is reported as a
            // connection failure, not a separate credential error.
            let key = decode_secret_key(key_content, params.passphrase.as_deref()).map_err(|e| {
                SshError::ConnectionFailed(host.clone(), format!("Failed to decode private key: {}", e))
            })?;

            let accepted = session
                .authenticate_publickey(&params.username, Arc::new(key))
                .await
                .map_err(|e| SshError::ConnectionFailed(host.clone(), e.to_string()))?;
            if accepted {
                tracing::info!("Public key authentication succeeded for {}@{}", params.username, host);
                return Ok(());
            }
            tracing::debug!("Server rejected private key for {}@{}", params.username, host);
        }

        if let Some(socket) = &params.agent_socket {
            attempted.push("agent");
            if agent::authenticate_with_agent(session, host, &params.username, socket).await? {
                tracing::info!("Agent authentication succeeded for {}@{}", params.username, host);
                return Ok(());
            }
        }

        if let Some(password) = &params.transport.password {
            attempted.push("password");
            let accepted = session
                .authenticate_password(&params.username, password)
                .await
                .map_err(|e| SshError::ConnectionFailed(host.clone(), e.to_string()))?;
            if accepted {
                tracing::info!("Password authentication succeeded for {}@{}", params.username, host);
                return Ok(());
            }
        }

        Err(auth_rejected(host, &params.username, &attempted))
    }
}

/// Authentication failure, reported like any other failed connect
fn auth_rejected(host: &str, username: &str, attempted: &[&str]) -> SshError {
    let reason = if attempted.is_empty() {
        format!(
            "No credentials available for {} (no private key, agent or password)",
            username
        )
    } else {
        format!(
            "Authentication rejected for {} (tried: {})",
            username,
            attempted.join(", ")
        )
    };
    SshError::ConnectionFailed(host.to_string(), reason)
}

#[async_trait]
impl Transport for RusshTransport {
    type Session = RusshSession;

    async fn connect(&self, params: &ConnectParams, tunnel: Option<BoxedStream>) -> Result<RusshSession> {
        let config = Arc::new(build_config(&params.transport));
        let forward_agent_to = if params.agent_forward {
            params.agent_socket.clone()
        } else {
            None
        };
        let (handler, watcher) = SshHandler::new(
            params.host.clone(),
            params.port,
            params.transport.host_key_policy,
            forward_agent_to,
        );

        let connected = match tunnel {
            Some(stream) => {
                tracing::info!("Connecting to {}:{} through tunnel", params.host, params.port);
                client::connect_stream(config, stream, handler).await
            }
            None => {
                let addr = host_port(&params.host, params.port);
                tracing::info!("Connecting to SSH server at {}", addr);
                client::connect(config, addr, handler).await
            }
        };

        let mut session = connected.map_err(|e| {
            watcher
                .check(&params.host, params.port)
                .unwrap_or_else(|| SshError::ConnectionFailed(params.host.clone(), e.to_string()))
        })?;

        Self::authenticate(&mut session, params).await?;

        tracing::info!("Successfully connected to {}", params.host);

        Ok(RusshSession {
            handle: session,
            host: params.host.clone(),
            agent_forward: params.agent_forward,
        })
    }
}

/// An authenticated russh session. Channel opens and disconnect only need a
/// shared handle, so concurrent clients never wait on each other here.
pub struct RusshSession {
    handle: Handle<SshHandler>,
    host: String,
    agent_forward: bool,
}

#[async_trait]
impl TransportSession for RusshSession {
    type Shell = RusshShell;

    async fn open_forwarded_channel(
        &self,
        bind_addr: &str,
        bind_port: u16,
        dest_host: &str,
        dest_port: u16,
    ) -> Result<BoxedStream> {
        tracing::debug!(
            "Opening direct-tcpip channel on {}: {}:{} -> {}:{}",
            self.host, bind_addr, bind_port, dest_host, dest_port
        );

        let channel = self
            .handle
            .channel_open_direct_tcpip(dest_host, dest_port as u32, bind_addr, bind_port as u32)
            .await
            .map_err(|e| SshError::ChannelOpenFailed {
            host: dest_host.to_string(),
            port: dest_port,
            reason: e.to_string(),
        })?;

        Ok(Box::new(channel.into_stream()))
    }

    async fn open_shell(&self, interactive: bool) -> Result<RusshShell> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Internal(format!("Failed to open SSH channel: {}", e)))?;

        if self.agent_forward {
            if let Err(e) = channel.agent_forward(false).await {
                tracing::warn!("Agent forwarding request failed on {}: {}", self.host, e);
            }
        }

        if interactive {
            channel
                .request_pty(true, "xterm-256color", 80, 24, 0, 0, &[])
                .await
                .map_err(|e| SshError::Internal(format!("Failed to request PTY: {}", e)))?;
        }

        channel
            .request_shell(true)
            .await
            .map_err(|e| SshError::Internal(format!("Failed to request shell: {}", e)))?;

        Ok(RusshShell { channel })
    }

    async fn end(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!("Disconnect from {} reported: {}", self.host, e);
        }
        tracing::info!("Disconnected from {}", self.host);
    }
}

/// Shell channel on a russh session
pub struct RusshShell {
    channel: Channel<Msg>,
}

#[async_trait]
impl ShellChannel for RusshShell {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| SshError::Io(format!("Failed to send to SSH channel: {}", e)))
    }

    async fn close_write(&mut self) -> Result<()> {
        self.channel
            .eof()
            .await
            .map_err(|e| SshError::Io(format!("Failed to send EOF: {}", e)))
    }

    async fn next_event(&mut self) -> Option<ShellEvent> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => return Some(ShellEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    return Some(ShellEvent::Stderr(data.to_vec()))
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ShellEvent::ExitStatus(exit_status))
                }
                ChannelMsg::Close => return None,
                // Eof, window adjustments and request replies
                _ => {}
            }
        }
    }
}
