//! SSH agent socket resolution, agent authentication and agent forwarding.
//!
//! The socket is resolved in this order: explicit option, `SSH_AUTH_SOCK`,
//! then the platform default (the OpenSSH named pipe on Windows, nothing
//! elsewhere). Resolution happens before any network I/O so a missing agent
//! aborts `establish` early.

use russh::client::{Handle, Msg};
use russh::Channel;
use russh_keys::agent::client::AgentClient;

use crate::models::error::{Result, SshError};
use crate::ssh::platform::{PlatformProbe, AGENT_SOCKET_ENV};
use crate::ssh::transport::BoxedStream;

pub struct AgentSocketResolver<'a> {
    platform: &'a dyn PlatformProbe,
}

impl<'a> AgentSocketResolver<'a> {
    pub fn new(platform: &'a dyn PlatformProbe) -> Self {
        Self { platform }
    }

    /// Resolve the agent socket. Only call this when forwarding was requested.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.platform.env_var(AGENT_SOCKET_ENV))
            .or_else(|| self.platform.default_agent_socket())
            .ok_or_else(|| {
                SshError::InvalidConfiguration(
                    "agent socket not provided and not resolvable from environment".to_string(),
                )
            })
    }
}

/// Open a byte stream to the agent at `socket`
pub async fn connect_agent_stream(socket: &str) -> std::io::Result<BoxedStream> {
    #[cfg(unix)]
    {
        let stream = tokio::net::UnixStream::connect(socket).await?;
        Ok(Box::new(stream))
    }

    #[cfg(windows)]
    {
        let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(socket)?;
        Ok(Box::new(pipe))
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("cannot reach SSH agent at {} on this platform", socket),
        ))
    }
}

/// Try every identity the agent holds until the server accepts one.
/// Returns `Ok(false)` when the agent has keys but none were accepted.
pub async fn authenticate_with_agent<H>(
    handle: &mut Handle<H>,
    host: &str,
    username: &str,
    socket: &str,
) -> Result<bool>
where
    H: russh::client::Handler,
{
    let stream = connect_agent_stream(socket).await.map_err(|e| {
        SshError::ConnectionFailed(host.to_string(), format!("Cannot connect to SSH agent at {}: {}", socket, e))
    })?;
    let mut agent = AgentClient::connect(stream);

    let identities = agent.request_identities().await.map_err(|e| {
        SshError::ConnectionFailed(host.to_string(), format!("Failed to list agent keys: {}", e))
    })?;

    if identities.is_empty() {
        tracing::warn!("SSH agent at {} has no keys loaded", socket);
        return Ok(false);
    }

    tracing::debug!("SSH agent offers {} key(s)", identities.len());

    for key in identities {
        let fingerprint = key.fingerprint();
        // Boxed as `dyn Future + Send` so the Send proof happens here rather than
        // inside this async body (works around a rustc higher-ranked lifetime limitation).
        let auth: std::pin::Pin<Box<dyn std::future::Future<Output = _> + Send + '_>> =
            Box::pin(handle.authenticate_future(username, key, agent));
        let (returned, result) = auth.await;
        agent = returned;
        match result {
            Ok(true) => {
                tracing::debug!("Agent key {} accepted", fingerprint);
                return Ok(true);
            }
            Ok(false) => tracing::debug!("Agent key {} rejected by server", fingerprint),
            Err(e) => tracing::warn!("Agent signing failed for key {}: {}", fingerprint, e),
        }
    }

    Ok(false)
}

/// Splice a server-opened agent channel onto the local agent
pub async fn relay_agent_channel(channel: Channel<Msg>, socket: String) {
    let mut local = match connect_agent_stream(&socket).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Agent forwarding: cannot reach agent at {}: {}", socket, e);
            return;
        }
    };

    let mut remote = channel.into_stream();
    match tokio::io::copy_bidirectional(&mut remote, &mut local).await {
        Ok((up, down)) => tracing::trace!("Agent channel closed ({} bytes up, {} bytes down)", up, down),
        Err(e) => tracing::debug!("Agent channel ended: {}", e),
    }
}
