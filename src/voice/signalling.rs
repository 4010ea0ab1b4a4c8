use serde::{Deserialize, Serialize};

use crate::common::types::{ChannelId, GuildId};

/// Outbound "update voice state" request. `channel_id: None` leaves the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStateRequest {
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// Inbound "voice server ready" event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceServerUpdate {
    pub guild_id: GuildId,
    pub token: String,
    /// `None` while the voice server is being reallocated.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Inbound "voice state changed" event for our own user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    pub session_id: String,
    /// `None` when we left (or were removed from) the channel.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
}

/// Bridge to whatever delivers signalling for a guild.
pub trait SignallingAdapter: Send + Sync {
    /// Returns `false` if the request could not be sent.
    fn send_voice_state(&self, request: &VoiceStateRequest) -> bool;

    /// The connection is gone; release anything held for it.
    fn destroy(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_update_without_channel() {
        let update: VoiceStateUpdate =
            serde_json::from_str(r#"{"guildId":"42","sessionId":"abc"}"#).unwrap();
        assert_eq!(update.guild_id, GuildId::from("42"));
        assert_eq!(update.channel_id, None);
    }

    #[test]
    fn request_serializes_camel_case() {
        let request = VoiceStateRequest {
            guild_id: "42".into(),
            channel_id: Some(ChannelId(7)),
            self_mute: false,
            self_deaf: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["channelId"], 7);
        assert_eq!(json["selfDeaf"], true);
    }
}
