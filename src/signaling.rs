//! WebSocket signaling relay pairing two peers per `/call/{id}`

mod manager;
mod messages;
mod policy;
mod router;
mod server;
mod session;
mod types;

pub use manager::{SessionManager, SessionStats, SignalingHooks};
pub use messages::{
    ClientMessage, DEFAULT_ICE_SERVER, IceServer, PEER_CONNECTION_RESOURCE, Payload,
    PeerConnectionConfig, ServerMessage,
};
pub use policy::AccessPolicy;
pub use server::SignalingServer;
pub use session::{Registry, SESSION_CAPACITY, Session};
pub use types::{
    CALL_PATH_PREFIX, Connection, ConnectionEnds, ConnectionId, OutboundMessage, SessionId,
    SignalingError,
};
