//! Public entry point: establish a session (directly or through a bastion)
//! and drive a shell, a single command or a port forward over it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::models::connection::ConnectionOptions;
use crate::models::error::{Result, SshError};
use crate::models::port_forward::ForwardingRule;
use crate::ssh::agent::AgentSocketResolver;
use crate::ssh::bastion::establish_via_bastion;
use crate::ssh::client::RusshTransport;
use crate::ssh::credentials::{CredentialResolver, PassphrasePrompt, ResolvedCredentials, TerminalPrompt};
use crate::ssh::platform::{self, PlatformProbe};
use crate::ssh::port_forward::ForwardingProxy;
use crate::ssh::registry::SessionRegistry;
use crate::ssh::shell::ShellDriver;
use crate::ssh::transport::{ConnectParams, Transport};

pub struct Orchestrator<T: Transport = RusshTransport> {
    options: ConnectionOptions,
    credentials: ResolvedCredentials,
    transport: T,
    platform: Box<dyn PlatformProbe>,
    registry: Mutex<SessionRegistry<T::Session>>,
}

impl Orchestrator<RusshTransport> {
    /// Resolve defaults from the environment. May read `~/.ssh/id_rsa` and
    /// prompt for its passphrase; never touches the network.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        Self::with_parts(options, RusshTransport::new(), platform::current(), &TerminalPrompt)
    }
}

impl<T: Transport> Orchestrator<T> {
    pub fn with_parts(
        options: ConnectionOptions,
        transport: T,
        platform: Box<dyn PlatformProbe>,
        prompt: &dyn PassphrasePrompt,
    ) -> Result<Self> {
        if options.end_host.trim().is_empty() {
            return Err(SshError::InvalidConfiguration("end host is required".to_string()));
        }

        let credentials = CredentialResolver::new(platform.as_ref(), prompt).resolve(&options)?;
        tracing::debug!(
            "Resolved credentials for {}@{}:{}",
            credentials.username, options.end_host, credentials.port
        );

        Ok(Self {
            options,
            credentials,
            transport,
            platform,
            registry: Mutex::new(SessionRegistry::new()),
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn credentials(&self) -> &ResolvedCredentials {
        &self.credentials
    }

    fn bastion_host(&self) -> Option<&str> {
        self.options
            .bastion_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
    }

    /// Parameters for the target leg. Fails before any I/O when agent
    /// forwarding was requested without a usable socket.
    fn connect_params(&self) -> Result<ConnectParams> {
        let agent_socket = if self.options.agent_forward {
            let socket = AgentSocketResolver::new(self.platform.as_ref())
                .resolve(self.options.agent_socket.as_deref())?;
            tracing::debug!("Using SSH agent at {}", socket);
            Some(socket)
        } else {
            None
        };

        Ok(ConnectParams {
            host: self.options.end_host.clone(),
            port: self.credentials.port,
            username: self.credentials.username.clone(),
            private_key: self.credentials.private_key.clone(),
            passphrase: self.credentials.passphrase.clone(),
            agent_socket,
            agent_forward: self.options.agent_forward,
            transport: self.options.transport.clone(),
        })
    }

    /// Open and register a session to the target
    pub async fn establish(&self) -> Result<Arc<T::Session>> {
        let params = self.connect_params()?;

        let session = match self.bastion_host() {
            Some(bastion) => {
                establish_via_bastion(&self.transport, &self.registry, bastion, &params).await?
            }
            None => self.transport.connect(&params, None).await?,
        };

        let (id, session) = self.registry.lock().await.register(session);
        tracing::info!("Session {} established to {}", id, params.host);
        Ok(session)
    }

    /// Interactive shell on the process's stdin/stdout
    pub async fn tty(&self) -> Result<()> {
        self.tty_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Interactive shell over the given streams. Everything is shut down once
    /// the remote side closes the channel.
    pub async fn tty_with<I, O>(&self, input: I, output: O) -> Result<()>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
    {
        let session = self.establish().await?;
        ShellDriver::new(input, output).run_shell(session.as_ref()).await?;
        self.shutdown().await;
        Ok(())
    }

    /// Run `command` in a remote shell, copying its output to stdout
    pub async fn execute_command(&self, command: &str) -> Result<()> {
        self.execute_command_with(command, tokio::io::stdout()).await
    }

    pub async fn execute_command_with<O>(&self, command: &str, output: O) -> Result<()>
    where
        O: AsyncWrite + Unpin + Send,
    {
        let session = self.establish().await?;
        ShellDriver::new(tokio::io::empty(), output)
            .run_command(session.as_ref(), command)
            .await?;
        self.shutdown().await;
        Ok(())
    }

    /// Start forwarding a loopback port through the target. Resolves once the
    /// listener is bound and returns its address.
    pub async fn forward(&self, rule: ForwardingRule) -> Result<SocketAddr> {
        self.registry.lock().await.ensure_listener_free()?;

        let session = self.establish().await?;
        let handle = ForwardingProxy::start(session, rule).await?;
        let local_addr = handle.local_addr();

        self.registry.lock().await.set_listener(handle).await?;
        Ok(local_addr)
    }

    /// End every session and close the listener. Never fails.
    pub async fn shutdown(&self) {
        self.registry.lock().await.shutdown().await;
    }
}
