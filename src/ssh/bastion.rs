//! Two-leg connect through a single jump host.
//!
//! The bastion session is registered as soon as it authenticates, so a
//! failure on the second leg still leaves it reachable by shutdown.

use tokio::sync::Mutex;

use crate::models::connection::DEFAULT_SSH_PORT;
use crate::models::error::Result;
use crate::ssh::registry::SessionRegistry;
use crate::ssh::transport::{ConnectParams, Transport, TransportSession};

/// Bastions are always dialed on the standard port
pub const BASTION_PORT: u16 = DEFAULT_SSH_PORT;

/// Originator reported for the tunnel channel on the bastion.
///
/// Fixed at loopback port 22 whatever the target's port is. The originator
/// fields of a direct-tcpip request are informational to the server, so the
/// value does not affect where the channel goes.
pub const TUNNEL_ORIGIN: (&str, u16) = ("127.0.0.1", 22);

/// Connect to `bastion_host`, open a channel through it to the target in
/// `params`, and run the target handshake over that channel.
pub async fn establish_via_bastion<T: Transport>(
    transport: &T,
    registry: &Mutex<SessionRegistry<T::Session>>,
    bastion_host: &str,
    params: &ConnectParams,
) -> Result<T::Session> {
    let bastion_params = params.with_destination(bastion_host, BASTION_PORT);
    tracing::info!(
        "Connecting to {}:{} via bastion {}",
        params.host, params.port, bastion_host
    );

    let bastion = transport.connect(&bastion_params, None).await?;
    let (id, bastion) = registry.lock().await.register(bastion);
    tracing::debug!("Bastion {} registered as {}", bastion_host, id);

    let (origin_addr, origin_port) = TUNNEL_ORIGIN;
    let tunnel = bastion
        .open_forwarded_channel(origin_addr, origin_port, &params.host, params.port)
        .await?;
    tracing::debug!("Tunnel to {}:{} open on bastion", params.host, params.port);

    transport.connect(params, Some(tunnel)).await
}
