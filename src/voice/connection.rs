//! Voice connection state machine.
//!
//! `Connecting -> Signalling -> Ready -> Disconnected -> Destroyed`, with
//! `Disconnected -> Connecting/Signalling` on rejoin. Credentials arrive from
//! the signalling collaborator in two halves (voice state and voice server);
//! once both are present a transport session is opened on a background task.
//! Every such attempt is numbered, so a late result from a superseded attempt
//! is closed and ignored.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    signalling::{SignallingAdapter, VoiceServerUpdate, VoiceStateRequest, VoiceStateUpdate},
    state::{ConnectionEvent, ConnectionState},
    transport::{MediaSession, MediaTransport, VoiceServerInfo},
};
use crate::{
    common::{
        errors::{ConnectionError, TransportError},
        types::{ChannelId, ConnectionId, GuildId, PlayerId},
    },
    player::AudioPlayer,
};

const EVENT_CAPACITY: usize = 32;

/// Where to join and how to present ourselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub self_mute: bool,
    pub self_deaf: bool,
}

struct Credentials {
    endpoint: String,
    token: String,
}

struct ConnectionCore {
    state: ConnectionState,
    channel_id: ChannelId,
    self_mute: bool,
    self_deaf: bool,
    server: Option<Credentials>,
    session_id: Option<String>,
    session: Option<Arc<dyn MediaSession>>,
    attempt: u64,
    /// Cancels the connect/watch task of the current attempt.
    cancel: CancellationToken,
    player: Option<AudioPlayer>,
}

struct ConnectionInner {
    id: ConnectionId,
    guild_id: GuildId,
    adapter: Arc<dyn SignallingAdapter>,
    transport: Arc<dyn MediaTransport>,
    core: Mutex<ConnectionCore>,
    events: broadcast::Sender<ConnectionEvent>,
}

#[derive(Clone)]
pub struct VoiceConnection {
    inner: Arc<ConnectionInner>,
}

impl VoiceConnection {
    /// Creates the connection in `Connecting` and asks the signalling side to join.
    pub fn join(
        config: JoinConfig,
        adapter: Arc<dyn SignallingAdapter>,
        transport: Arc<dyn MediaTransport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::next(),
                guild_id: config.guild_id,
                adapter,
                transport,
                core: Mutex::new(ConnectionCore {
                    state: ConnectionState::Connecting,
                    channel_id: config.channel_id,
                    self_mute: config.self_mute,
                    self_deaf: config.self_deaf,
                    server: None,
                    session_id: None,
                    session: None,
                    attempt: 0,
                    cancel: CancellationToken::new(),
                    player: None,
                }),
                events,
            }),
        };

        info!(
            "[{}] joining voice channel {} ({})",
            connection.inner.guild_id, config.channel_id, connection.inner.id
        );
        let request = connection.request(Some(config.channel_id));
        if !connection.inner.adapter.send_voice_state(&request) {
            let mut core = connection.inner.core.lock();
            connection.set_state(&mut core, ConnectionState::Disconnected);
            connection.signalling_failed();
        }
        connection
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.inner.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.inner.core.lock().channel_id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn subscribed_player(&self) -> Option<PlayerId> {
        self.inner.core.lock().player.as_ref().map(AudioPlayer::id)
    }

    /// Second half of the credentials: transport endpoint and token.
    pub fn on_voice_server_update(&self, update: VoiceServerUpdate) {
        let mut core = self.inner.core.lock();
        if core.state == ConnectionState::Destroyed {
            return;
        }

        match update.endpoint {
            Some(endpoint) => {
                core.server = Some(Credentials {
                    endpoint,
                    token: update.token,
                });
                // A new endpoint always means a new session.
                self.try_connect(&mut core);
            }
            None => {
                debug!(
                    "[{}] voice server is being reallocated, waiting for a new endpoint",
                    self.inner.guild_id
                );
                core.server = None;
            }
        }
    }

    /// First half of the credentials: session id and channel, or `None` if we left.
    pub fn on_voice_state_update(&self, update: VoiceStateUpdate) {
        let mut core = self.inner.core.lock();
        if core.state == ConnectionState::Destroyed {
            return;
        }

        let Some(channel_id) = update.channel_id else {
            info!("[{}] left voice channel", self.inner.guild_id);
            self.drop_session(&mut core);
            core.server = None;
            core.session_id = None;
            self.set_state(&mut core, ConnectionState::Disconnected);
            return;
        };

        core.channel_id = channel_id;
        core.session_id = Some(update.session_id);
        if matches!(
            core.state,
            ConnectionState::Connecting | ConnectionState::Disconnected
        ) {
            self.try_connect(&mut core);
        }
    }

    /// Leaves the channel but keeps the connection reusable through [`rejoin`](Self::rejoin).
    pub fn disconnect(&self) -> bool {
        if self.state() == ConnectionState::Destroyed {
            return false;
        }
        if !self.inner.adapter.send_voice_state(&self.request(None)) {
            self.signalling_failed();
            return false;
        }

        let mut core = self.inner.core.lock();
        if core.state == ConnectionState::Destroyed {
            return false;
        }
        self.drop_session(&mut core);
        core.server = None;
        core.session_id = None;
        self.set_state(&mut core, ConnectionState::Disconnected);
        true
    }

    /// Asks to (re)join, optionally moving to another channel.
    pub fn rejoin(&self, channel_id: Option<ChannelId>) -> bool {
        let request = {
            let mut core = self.inner.core.lock();
            if core.state == ConnectionState::Destroyed {
                return false;
            }
            if let Some(channel_id) = channel_id {
                core.channel_id = channel_id;
            }
            self.build_request(&core, Some(core.channel_id))
        };

        if !self.inner.adapter.send_voice_state(&request) {
            self.signalling_failed();
            return false;
        }

        let mut core = self.inner.core.lock();
        if core.state == ConnectionState::Disconnected {
            self.set_state(&mut core, ConnectionState::Connecting);
        }
        true
    }

    /// Terminal teardown. Fails with [`ConnectionError::Destroyed`] if already destroyed.
    pub fn destroy(&self) -> Result<(), ConnectionError> {
        let (request, player) = {
            let mut core = self.inner.core.lock();
            if core.state == ConnectionState::Destroyed {
                return Err(ConnectionError::Destroyed);
            }
            let player = core.player.take();
            self.drop_session(&mut core);
            self.set_state(&mut core, ConnectionState::Destroyed);
            (self.build_request(&core, None), player)
        };

        if let Some(player) = player {
            player.detach(self.inner.id);
        }
        let _ = self.inner.adapter.send_voice_state(&request);
        self.inner.adapter.destroy();
        info!("[{}] voice connection destroyed", self.inner.guild_id);
        Ok(())
    }

    /// Routes this connection's frames from `player`, replacing any previous player.
    pub fn subscribe(&self, player: &AudioPlayer) -> Result<(), ConnectionError> {
        let mut core = self.inner.core.lock();
        if core.state == ConnectionState::Destroyed {
            return Err(ConnectionError::Destroyed);
        }

        if let Some(previous) = core.player.take() {
            if previous.id() == player.id() {
                core.player = Some(previous);
                return Ok(());
            }
            previous.detach(self.inner.id);
        }

        let session = match core.state {
            ConnectionState::Ready => core.session.clone(),
            _ => None,
        };
        player.attach(self.inner.id, session);
        core.player = Some(player.clone());
        Ok(())
    }

    pub fn unsubscribe(&self) -> bool {
        match self.inner.core.lock().player.take() {
            Some(player) => {
                player.detach(self.inner.id);
                true
            }
            None => false,
        }
    }

    fn request(&self, channel_id: Option<ChannelId>) -> VoiceStateRequest {
        let core = self.inner.core.lock();
        self.build_request(&core, channel_id)
    }

    fn build_request(&self, core: &ConnectionCore, channel_id: Option<ChannelId>) -> VoiceStateRequest {
        VoiceStateRequest {
            guild_id: self.inner.guild_id.clone(),
            channel_id,
            self_mute: core.self_mute,
            self_deaf: core.self_deaf,
        }
    }

    fn set_state(&self, core: &mut ConnectionCore, new: ConnectionState) {
        let old = std::mem::replace(&mut core.state, new);
        if old != new {
            debug!("[{}] connection {:?} -> {:?}", self.inner.guild_id, old, new);
            let _ = self
                .inner
                .events
                .send(ConnectionEvent::StateChange { old, new });
        }
    }

    fn emit_error(&self, error: ConnectionError) {
        warn!("[{}] voice connection error: {}", self.inner.guild_id, error);
        let _ = self.inner.events.send(ConnectionEvent::Error(error));
    }

    fn signalling_failed(&self) {
        self.emit_error(ConnectionError::Signalling(
            "voice state request could not be sent".into(),
        ));
    }

    /// Opens a transport session if both credential halves are present.
    fn try_connect(&self, core: &mut ConnectionCore) {
        let (Some(server), Some(session_id)) = (&core.server, &core.session_id) else {
            return;
        };
        let info = VoiceServerInfo {
            guild_id: self.inner.guild_id.clone(),
            channel_id: core.channel_id,
            endpoint: server.endpoint.clone(),
            token: server.token.clone(),
            session_id: session_id.clone(),
        };

        self.drop_session(core);
        core.attempt += 1;
        core.cancel = CancellationToken::new();
        self.set_state(core, ConnectionState::Signalling);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("[{}] no runtime to open the media session on", self.inner.guild_id);
            self.set_state(core, ConnectionState::Disconnected);
            return;
        };
        runtime.spawn(establish(
            Arc::downgrade(&self.inner),
            self.inner.transport.clone(),
            info,
            core.attempt,
            core.cancel.clone(),
        ));
    }

    /// Cancels the current attempt and closes its session, if any.
    fn drop_session(&self, core: &mut ConnectionCore) {
        core.cancel.cancel();
        let Some(session) = core.session.take() else {
            return;
        };
        if let Some(player) = &core.player {
            player.session_lost(self.inner.id);
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { session.close().await });
        }
    }

    fn session_established(&self, attempt: u64, session: &Arc<dyn MediaSession>) -> bool {
        let mut core = self.inner.core.lock();
        if core.attempt != attempt || core.state != ConnectionState::Signalling {
            return false;
        }

        core.session = Some(session.clone());
        self.set_state(&mut core, ConnectionState::Ready);
        if let Some(player) = &core.player {
            player.session_ready(self.inner.id, session.clone());
        }
        info!("[{}] voice connection ready", self.inner.guild_id);
        true
    }

    fn connect_failed(&self, attempt: u64, error: TransportError) {
        let mut core = self.inner.core.lock();
        if core.attempt != attempt || core.state != ConnectionState::Signalling {
            return;
        }
        core.server = None;
        self.set_state(&mut core, ConnectionState::Disconnected);
        drop(core);
        self.emit_error(error.into());
    }

    fn session_lost(&self, attempt: u64, reason: TransportError) {
        let mut core = self.inner.core.lock();
        if core.attempt != attempt || core.state != ConnectionState::Ready {
            return;
        }
        core.session = None;
        core.server = None;
        if let Some(player) = &core.player {
            player.session_lost(self.inner.id);
        }
        self.set_state(&mut core, ConnectionState::Disconnected);
        drop(core);
        self.emit_error(reason.into());
    }
}

impl fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConnection")
            .field("id", &self.inner.id)
            .field("guild_id", &self.inner.guild_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Opens the session for one attempt, then watches it until it is lost or
/// the attempt is cancelled.
async fn establish(
    connection: Weak<ConnectionInner>,
    transport: Arc<dyn MediaTransport>,
    info: VoiceServerInfo,
    attempt: u64,
    cancel: CancellationToken,
) {
    debug!("[{}] connecting to {}", info.guild_id, info.endpoint);
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = transport.connect(&info) => result,
    };

    let Some(inner) = connection.upgrade() else {
        if let Ok(session) = result {
            session.close().await;
        }
        return;
    };
    let owner = VoiceConnection { inner };

    let session = match result {
        Ok(session) => session,
        Err(e) => {
            owner.connect_failed(attempt, e);
            return;
        }
    };
    if !owner.session_established(attempt, &session) {
        session.close().await;
        return;
    }
    drop(owner);

    let reason = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        reason = session.closed() => reason,
    };
    if let Some(inner) = connection.upgrade() {
        VoiceConnection { inner }.session_lost(attempt, reason);
    }
}
