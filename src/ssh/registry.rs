use std::sync::Arc;

use crate::models::error::{Result, SshError};
use crate::ssh::port_forward::ForwardHandle;
use crate::ssh::transport::TransportSession;

/// Stable identifier of a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Every session the orchestrator has opened, in establishment order, plus
/// the single forwarding listener slot
pub struct SessionRegistry<S: TransportSession> {
    sessions: Vec<(SessionId, Arc<S>)>,
    next_id: u64,
    listener: Option<ForwardHandle>,
}

impl<S: TransportSession> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 0,
            listener: None,
        }
    }

    /// Take ownership of an authenticated session
    pub fn register(&mut self, session: S) -> (SessionId, Arc<S>) {
        let id = SessionId(self.next_id);
        self.next_id += 1;

        let session = Arc::new(session);
        self.sessions.push((id, session.clone()));
        tracing::debug!("Registered {} ({} live)", id, self.sessions.len());
        (id, session)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<S>> {
        self.sessions
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, s)| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Fails if the slot is already taken
    pub fn ensure_listener_free(&self) -> Result<()> {
        match &self.listener {
            Some(existing) => Err(SshError::InvalidOperation {
                message: format!(
                    "a port forward to {}:{} is already listening on {}",
                    existing.rule().to_host,
                    existing.rule().to_port,
                    existing.local_addr()
                ),
            }),
            None => Ok(()),
        }
    }

    /// Occupy the listener slot. A handle that cannot be stored is closed.
    pub async fn set_listener(&mut self, handle: ForwardHandle) -> Result<()> {
        if let Err(e) = self.ensure_listener_free() {
            handle.close().await;
            return Err(e);
        }
        self.listener = Some(handle);
        Ok(())
    }

    /// End every session in registration order, then close the listener.
    /// Safe to call repeatedly; never fails.
    pub async fn shutdown(&mut self) {
        if self.sessions.is_empty() && self.listener.is_none() {
            tracing::trace!("Shutdown with nothing registered");
            return;
        }

        let sessions = std::mem::take(&mut self.sessions);
        tracing::info!("Shutting down {} session(s)", sessions.len());
        for (id, session) in sessions {
            session.end().await;
            tracing::debug!("Ended {}", id);
        }

        if let Some(listener) = self.listener.take() {
            listener.close().await;
        }
    }
}

impl<S: TransportSession> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
