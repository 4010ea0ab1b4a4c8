use serde::Serialize;

use crate::common::errors::ConnectionError;

/// Lifecycle of a [`VoiceConnection`](super::VoiceConnection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Join requested, waiting for credentials.
    Connecting,
    /// Credentials received, opening the transport session.
    Signalling,
    Ready,
    Disconnected,
    /// Terminal.
    Destroyed,
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChange {
        old: ConnectionState,
        new: ConnectionState,
    },
    Error(ConnectionError),
}
