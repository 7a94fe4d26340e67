use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, PeerConnectionConfig, ServerMessage};
use super::router;
use super::session::Registry;
use super::types::{Connection, SessionId, SignalingError};

/// Entry points the WebSocket transport calls for every connection.
///
/// The transport guarantees `on_handshake` before `on_open`, `on_open` before
/// any `on_message`, and exactly one `on_close` per connection whose
/// `on_open` succeeded. Calls for different connections may run concurrently.
pub trait SignalingHooks {
    /// Admission check before the WebSocket upgrade completes.
    fn on_handshake(&self, session: &SessionId) -> Result<(), SignalingError>;

    /// Attach the connection to its session and flush anything queued for it.
    fn on_open(&self, connection: &Connection) -> Result<(), SignalingError>;

    /// Handle one text frame. An error means the connection should be closed.
    fn on_message(&self, connection: &Connection, text: &str) -> Result<(), SignalingError>;

    /// Detach the connection, hang up its peer and drop the session once empty.
    fn on_close(&self, connection: &Connection) -> Result<(), SignalingError>;
}

/// Member and queue counts of one live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub members: usize,
    pub pending: usize,
}

/// Shared handle to the session registry
#[derive(Clone)]
pub struct SessionManager {
    registry: Arc<Mutex<Registry>>,
    peer_config: Arc<PeerConnectionConfig>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(PeerConnectionConfig::default())
    }
}

impl SessionManager {
    pub fn new(peer_config: PeerConnectionConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            peer_config: Arc::new(peer_config),
        }
    }

    pub fn peer_config(&self) -> &PeerConnectionConfig {
        &self.peer_config
    }

    /// Every registry and session mutation happens under this lock.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Registry>, SignalingError> {
        self.registry
            .lock()
            .map_err(|_| SignalingError::Internal("session registry lock poisoned".to_string()))
    }

    pub fn session_stats(&self, id: &SessionId) -> Option<SessionStats> {
        let registry = self.lock().ok()?;
        registry.get(id).map(|session| SessionStats {
            members: session.member_count(),
            pending: session.pending_count(),
        })
    }

    pub fn session_count(&self) -> usize {
        self.lock().map(|registry| registry.len()).unwrap_or(0)
    }
}

impl SignalingHooks for SessionManager {
    fn on_handshake(&self, session: &SessionId) -> Result<(), SignalingError> {
        if self.lock()?.is_full(session) {
            debug!("Session {} is full", session);
            return Err(SignalingError::SpaceFull(session.clone()));
        }
        Ok(())
    }

    fn on_open(&self, connection: &Connection) -> Result<(), SignalingError> {
        let mut registry = self.lock()?;
        let session = registry.get_or_create(connection.session());
        if let Err(e) = session.attach(connection.clone()) {
            warn!(
                "Late rejection of {} from {}: {}",
                connection.id(),
                connection.addr(),
                e
            );
            return Err(e);
        }

        // Flushed while still locked so a NOTIFY relayed by the peer right after
        // attach cannot overtake the queued ones. The send only enqueues on an
        // unbounded channel and never calls back into the registry.
        let pending = session.drain_all();
        if !pending.is_empty() {
            debug!(
                "Flushing {} queued message(s) to {} in session {}",
                pending.len(),
                connection.id(),
                connection.session()
            );
        }
        for payload in &pending {
            match ServerMessage::notify(payload).to_json() {
                Ok(json) => {
                    if let Err(e) = connection.send(json.into()) {
                        debug!("Flush to {} stopped: {}", connection.id(), e);
                        break;
                    }
                }
                Err(e) => error!("Failed to encode queued message: {}", e),
            }
        }

        info!(
            "Connection {} from {} joined session {}",
            connection.id(),
            connection.addr(),
            connection.session()
        );
        Ok(())
    }

    fn on_message(&self, connection: &Connection, text: &str) -> Result<(), SignalingError> {
        debug!("Message from {}: {}", connection.id(), text);
        let message = ClientMessage::parse(text)?;
        router::dispatch(self, connection, message)
    }

    fn on_close(&self, connection: &Connection) -> Result<(), SignalingError> {
        let peer = {
            let mut registry = self.lock()?;
            let Some(session) = registry.get_mut(connection.session()) else {
                return Ok(());
            };

            // A connection that is no longer a member (rejected late, or already
            // detached by its peer's hangup) must not hang up whoever is there now.
            let peer = if session.contains(connection.id()) {
                session.other_member(connection.id()).cloned()
            } else {
                None
            };

            session.detach(connection.id());
            if let Some(peer) = &peer {
                session.detach(peer.id());
            }
            registry.remove_if_empty(connection.session());
            peer
        };

        info!(
            "Connection {} left session {}",
            connection.id(),
            connection.session()
        );
        if let Some(peer) = peer {
            info!("Hanging up {} in session {}", peer.id(), peer.session());
            peer.close();
        }
        Ok(())
    }
}
