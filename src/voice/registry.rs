use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::{
    connection::{JoinConfig, VoiceConnection},
    signalling::{SignallingAdapter, VoiceServerUpdate, VoiceStateUpdate},
    state::ConnectionState,
    transport::MediaTransport,
};
use crate::common::types::GuildId;

/// Alias for the live connections, one per guild.
pub type ConnectionMap = DashMap<GuildId, VoiceConnection>;

/// Owns every voice connection created through it and routes signalling
/// events to them.
///
/// Connections are keyed by guild alone: a session holds at most one voice
/// channel per guild, so joining another channel of the same guild replaces
/// (and destroys) the existing connection rather than adding a second one.
pub struct ConnectionRegistry {
    transport: Arc<dyn MediaTransport>,
    connections: ConnectionMap,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn MediaTransport>) -> Self {
        Self {
            transport,
            connections: DashMap::new(),
        }
    }

    /// Joins `config.channel_id`. An existing connection for the same guild is
    /// destroyed and replaced.
    pub fn join(&self, config: JoinConfig, adapter: Arc<dyn SignallingAdapter>) -> VoiceConnection {
        let guild_id = config.guild_id.clone();
        if let Some((_, previous)) = self.connections.remove(&guild_id) {
            debug!(
                "[{}] replacing connection to channel {}",
                guild_id,
                previous.channel_id()
            );
            let _ = previous.destroy();
        }

        let connection = VoiceConnection::join(config, adapter, self.transport.clone());
        self.connections.insert(guild_id, connection.clone());
        connection
    }

    /// Live connection for `guild_id`; destroyed ones are evicted on lookup.
    pub fn get(&self, guild_id: &GuildId) -> Option<VoiceConnection> {
        let connection = self.connections.get(guild_id)?.value().clone();
        if connection.state() == ConnectionState::Destroyed {
            self.connections
                .remove_if(guild_id, |_, c| c.id() == connection.id());
            return None;
        }
        Some(connection)
    }

    /// Destroys and forgets the connection for `guild_id`.
    pub fn remove(&self, guild_id: &GuildId) -> bool {
        match self.connections.remove(guild_id) {
            Some((_, connection)) => {
                info!("[{}] removing voice connection", guild_id);
                connection.destroy().is_ok()
            }
            None => false,
        }
    }

    /// Returns `false` if no connection exists for the event's guild.
    pub fn route_server_update(&self, update: VoiceServerUpdate) -> bool {
        match self.get(&update.guild_id) {
            Some(connection) => {
                connection.on_voice_server_update(update);
                true
            }
            None => false,
        }
    }

    pub fn route_state_update(&self, update: VoiceStateUpdate) -> bool {
        match self.get(&update.guild_id) {
            Some(connection) => {
                connection.on_voice_state_update(update);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Destroys every connection.
    pub fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.connections.iter().map(|e| e.key().clone()).collect();
        for guild_id in guilds {
            self.remove(&guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        common::types::ChannelId,
        testing::{RecordingSignalling, RecordingTransport},
    };

    fn config(guild: &str, channel: u64) -> JoinConfig {
        JoinConfig {
            guild_id: guild.into(),
            channel_id: ChannelId(channel),
            self_mute: false,
            self_deaf: false,
        }
    }

    #[tokio::test]
    async fn join_replaces_connection_for_same_guild() {
        let registry = ConnectionRegistry::new(RecordingTransport::new());
        let first_adapter = RecordingSignalling::new();

        let first = registry.join(config("1", 10), first_adapter.clone());
        let second = registry.join(config("1", 20), RecordingSignalling::new());
        let other = registry.join(config("2", 10), RecordingSignalling::new());

        assert_eq!(first.state(), ConnectionState::Destroyed);
        assert!(first_adapter.is_destroyed());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&"1".into()).map(|c| c.id()), Some(second.id()));
        assert_eq!(registry.get(&"2".into()).map(|c| c.id()), Some(other.id()));
    }

    #[tokio::test]
    async fn routes_credentials_by_guild() {
        let transport = RecordingTransport::new();
        let registry = ConnectionRegistry::new(transport.clone());
        let connection = registry.join(config("1", 10), RecordingSignalling::new());
        let mut events = connection.events();

        assert!(registry.route_state_update(VoiceStateUpdate {
            guild_id: "1".into(),
            session_id: "s".into(),
            channel_id: Some(ChannelId(10)),
        }));
        assert!(registry.route_server_update(VoiceServerUpdate {
            guild_id: "1".into(),
            token: "t".into(),
            endpoint: Some("media.example.com".into()),
        }));
        assert!(!registry.route_server_update(VoiceServerUpdate {
            guild_id: "9".into(),
            token: "t".into(),
            endpoint: Some("media.example.com".into()),
        }));

        tokio::time::timeout(Duration::from_secs(2), async {
            while connection.state() != ConnectionState::Ready {
                let _ = events.recv().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(transport.connects().len(), 1);
    }

    #[tokio::test]
    async fn destroyed_connections_are_evicted() {
        let registry = ConnectionRegistry::new(RecordingTransport::new());
        let connection = registry.join(config("1", 10), RecordingSignalling::new());

        connection.destroy().unwrap();
        assert!(registry.get(&"1".into()).is_none());
        assert!(registry.is_empty());
        assert!(!registry.remove(&"1".into()));
    }

    #[tokio::test]
    async fn shutdown_destroys_everything() {
        let registry = ConnectionRegistry::new(RecordingTransport::new());
        let a = registry.join(config("1", 10), RecordingSignalling::new());
        let b = registry.join(config("2", 10), RecordingSignalling::new());

        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(a.state(), ConnectionState::Destroyed);
        assert_eq!(b.state(), ConnectionState::Destroyed);
    }
}
