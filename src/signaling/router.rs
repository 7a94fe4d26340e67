//! Dispatch of parsed client messages.

use tracing::{debug, warn};

use super::manager::SessionManager;
use super::messages::{ClientMessage, Payload, ServerMessage};
use super::types::{Connection, SignalingError};

pub(crate) fn dispatch(
    manager: &SessionManager,
    connection: &Connection,
    message: ClientMessage,
) -> Result<(), SignalingError> {
    match message {
        ClientMessage::GetConfig { msg_id } => {
            let response = ServerMessage::config(manager.peer_config(), msg_id.as_deref());
            connection.send(response.to_json()?.into())
        }
        ClientMessage::Notify { data } => relay(manager, connection, data),
        ClientMessage::Unrecognized { reason } => {
            warn!("Ignoring message from {}: {}", connection.id(), reason);
            Ok(())
        }
    }
}

/// Forward `data` to the other member, or queue it until one attaches.
fn relay(
    manager: &SessionManager,
    connection: &Connection,
    data: Payload,
) -> Result<(), SignalingError> {
    if connection.is_closing() {
        debug!("Dropping NOTIFY from {}: hanging up", connection.id());
        return Ok(());
    }

    let peer = {
        let mut registry = manager.lock()?;
        let session = registry.get_or_create(connection.session());
        match session.other_member(connection.id()).cloned() {
            Some(peer) => peer,
            None => {
                debug!(
                    "Queueing NOTIFY from {} in session {}",
                    connection.id(),
                    connection.session()
                );
                session.enqueue(connection.id(), data);
                return Ok(());
            }
        }
    };

    let json = ServerMessage::notify(&data).to_json()?;
    // Best effort: a peer whose socket is already gone just misses the message.
    if let Err(e) = peer.send(json.into()) {
        debug!("NOTIFY from {} not delivered: {}", connection.id(), e);
    }
    Ok(())
}
