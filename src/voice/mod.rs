pub mod connection;
pub mod registry;
pub mod signalling;
pub mod sink;
pub mod state;
pub mod transport;

pub use connection::{JoinConfig, VoiceConnection};
pub use registry::ConnectionRegistry;
pub use signalling::{SignallingAdapter, VoiceServerUpdate, VoiceStateRequest, VoiceStateUpdate};
pub use sink::PcmFileTransport;
pub use state::{ConnectionEvent, ConnectionState};
pub use transport::{MediaSession, MediaTransport, VoiceServerInfo};
