use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::error::{Result, SshError};
use crate::models::port_forward::ForwardingRule;
use crate::ssh::transport::TransportSession;

/// Loopback address the proxy listens on and reports as channel origin
pub const LOOPBACK: &str = "127.0.0.1";

/// A running forwarding listener
pub struct ForwardHandle {
    rule: ForwardingRule,
    local_addr: SocketAddr,
    /// Cancels the accept loop and every relay it spawned
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl ForwardHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn rule(&self) -> &ForwardingRule {
        &self.rule
    }

    /// Stop accepting, cut active relays and wait for the listener to close
    pub async fn close(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Forward listener task ended abnormally: {}", e);
        }
        tracing::info!(
            "Port forward {} -> {}:{} closed",
            self.local_addr, self.rule.to_host, self.rule.to_port
        );
    }
}

/// Local TCP listener splicing each client onto a forwarded channel
pub struct ForwardingProxy;

impl ForwardingProxy {
    /// Bind the listener and start accepting. Returns once the socket is bound;
    /// no client needs to have connected.
    pub async fn start<S: TransportSession>(session: Arc<S>, rule: ForwardingRule) -> Result<ForwardHandle> {
        let listener = TcpListener::bind((LOOPBACK, rule.from_port))
            .await
            .map_err(|e| SshError::Io(format!("Failed to bind to port {}: {}", rule.from_port, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| SshError::Io(format!("Failed to get local address: {}", e)))?;

        tracing::info!(
            "Port forward listening on {} -> {}:{}",
            local_addr, rule.to_host, rule.to_port
        );

        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(Self::run_listener(
            listener,
            session,
            rule.clone(),
            local_addr.port(),
            cancel_token.clone(),
        ));

        Ok(ForwardHandle {
            rule,
            local_addr,
            cancel_token,
            task,
        })
    }

    /// Accept loop; one relay task per client
    async fn run_listener<S: TransportSession>(
        listener: TcpListener,
        session: Arc<S>,
        rule: ForwardingRule,
        bound_port: u16,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            tracing::debug!("Accepted forward client {}", addr);

                            let session = session.clone();
                            let rule = rule.clone();
                            let token = cancel_token.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(socket, session, &rule, bound_port, token).await {
                                    tracing::error!("Forward client {} dropped: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    tracing::debug!("Port forward on port {} shutting down", bound_port);
                    break;
                }
            }
        }
    }

    /// Serve one client until it finishes or the forward is closed. A channel
    /// open that never completes is abandoned on close as well.
    async fn handle_connection<S: TransportSession>(
        client: TcpStream,
        session: Arc<S>,
        rule: &ForwardingRule,
        bound_port: u16,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            result = Self::relay(client, session.as_ref(), rule, bound_port) => result,
            _ = cancel_token.cancelled() => {
                tracing::debug!("Forward client cancelled by shutdown");
                Ok(())
            }
        }
    }

    /// Open a forwarded channel and pipe bytes both ways until either side closes
    async fn relay<S: TransportSession>(
        mut client: TcpStream,
        session: &S,
        rule: &ForwardingRule,
        bound_port: u16,
    ) -> Result<()> {
        let mut channel = session
            .open_forwarded_channel(LOOPBACK, bound_port, &rule.to_host, rule.to_port)
            .await?;

        tracing::debug!("Channel to {}:{} opened, starting relay", rule.to_host, rule.to_port);

        let (from_client, from_remote) = tokio::io::copy_bidirectional(&mut client, &mut channel).await?;
        tracing::debug!(
            "Forward completed: {} bytes from client, {} bytes from remote",
            from_client, from_remote
        );
        Ok(())
    }
}
