use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    audio::Frame,
    common::{
        errors::TransportError,
        types::{ChannelId, GuildId},
    },
};

/// Everything a transport needs to open a media session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServerInfo {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
}

/// Opens real-time media sessions.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn connect(&self, info: &VoiceServerInfo) -> Result<Arc<dyn MediaSession>, TransportError>;
}

/// An established media session that accepts PCM frames.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// May apply its own flow control; the player awaits it before moving on.
    async fn submit_frame(&self, frame: &Frame) -> Result<(), TransportError>;

    async fn close(&self);

    /// Resolves once the session is gone, with the reason.
    async fn closed(&self) -> TransportError;
}
