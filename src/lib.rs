//! Rendezvous-and-relay server for two-party WebRTC signaling.
//!
//! Two clients connect to the same `/call/{id}` WebSocket path and exchange
//! `NOTIFY` messages (offers, answers, ICE candidates). Messages sent before
//! the second client arrives are queued and delivered when it joins. A
//! `GET /peerconnection` request returns the ICE server configuration.

pub mod config;
pub mod signaling;
pub mod tls;
