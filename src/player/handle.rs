use std::{fmt, sync::Arc};

use tokio::sync::{broadcast, oneshot, watch};

use super::{
    context::{PlayerCommand, PlayerContext},
    state::{PlaybackStats, PlayerEvent, PlayerState, PlayerStatus, StatsSnapshot},
};
use crate::{
    audio::{AudioResource, PipelineSpawner, ProcessSpawner},
    common::{
        errors::{ConnectionError, PlayerError},
        types::{AnyResult, ConnectionId, PlayerId},
    },
    configs::Config,
    voice::{MediaSession, VoiceConnection},
};

const EVENT_CAPACITY: usize = 64;

/// Cloneable handle to a player task.
///
/// All handles talk to the same task; the task exits once the last handle
/// (including the ones held by subscribed connections) is dropped.
#[derive(Clone)]
pub struct AudioPlayer {
    id: PlayerId,
    commands: flume::Sender<PlayerCommand>,
    state: watch::Receiver<PlayerState>,
    events: broadcast::Sender<PlayerEvent>,
    stats: Arc<PlaybackStats>,
}

impl AudioPlayer {
    /// Player decoding through the external tools configured in `[decoder]`.
    /// Must be called inside a tokio runtime.
    pub fn new(config: &Config) -> AnyResult<Self> {
        let spawner = ProcessSpawner::new(config.decoder.clone(), config.audio.format())?;
        Self::with_spawner(config, Arc::new(spawner))
    }

    /// Fails if `config` does not pass [`Config::validate`].
    pub fn with_spawner(config: &Config, spawner: Arc<dyn PipelineSpawner>) -> AnyResult<Self> {
        config.validate()?;

        let id = PlayerId::next();
        let (commands, command_rx) = flume::unbounded();
        let (state_tx, state) = watch::channel(PlayerState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let stats = Arc::new(PlaybackStats::default());

        let context = PlayerContext::new(
            id,
            config,
            spawner,
            command_rx,
            state_tx,
            events.clone(),
            stats.clone(),
        );
        tokio::spawn(context.run());

        Ok(Self {
            id,
            commands,
            state,
            events,
            stats,
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Replaces whatever is playing with `resource` and moves to `Buffering`.
    ///
    /// Decoding starts as soon as a subscribed connection is ready.
    pub async fn play(&self, resource: AudioResource) -> Result<(), PlayerError> {
        if resource.ended() {
            return Err(PlayerError::ResourceEnded);
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(PlayerCommand::Play { resource, reply })
            .map_err(|_| PlayerError::Closed)?;
        rx.await.map_err(|_| PlayerError::Closed)?
    }

    /// `Playing`/`AutoPaused` -> `Paused`. Buffering continues.
    pub async fn pause(&self) -> bool {
        self.request(|reply| PlayerCommand::Pause { reply }).await
    }

    /// `Paused` -> `Playing`.
    pub async fn unpause(&self) -> bool {
        self.request(|reply| PlayerCommand::Unpause { reply }).await
    }

    /// Kills the pipeline, drops buffered audio and moves to `Idle`.
    ///
    /// Returns `false` if the player was already idle; `force` still resets
    /// its internal state in that case.
    pub async fn stop(&self, force: bool) -> bool {
        self.request(|reply| PlayerCommand::Stop { force, reply }).await
    }

    pub fn subscribe(&self, connection: &VoiceConnection) -> Result<(), ConnectionError> {
        connection.subscribe(self)
    }

    /// Returns `false` if `connection` was not subscribed to this player.
    pub fn unsubscribe(&self, connection: &VoiceConnection) -> bool {
        if connection.subscribed_player() != Some(self.id) {
            return false;
        }
        connection.unsubscribe()
    }

    pub fn state(&self) -> PlayerState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.borrow().status()
    }

    /// Receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<PlayerState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<bool>) -> PlayerCommand) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(make(reply)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub(crate) fn attach(&self, id: ConnectionId, session: Option<Arc<dyn MediaSession>>) {
        let _ = self.commands.send(PlayerCommand::Attach { id, session });
    }

    pub(crate) fn detach(&self, id: ConnectionId) {
        let _ = self.commands.send(PlayerCommand::Detach { id });
    }

    pub(crate) fn session_ready(&self, id: ConnectionId, session: Arc<dyn MediaSession>) {
        let _ = self.commands.send(PlayerCommand::SessionReady { id, session });
    }

    pub(crate) fn session_lost(&self, id: ConnectionId) {
        let _ = self.commands.send(PlayerCommand::SessionLost { id });
    }

    /// Resolves once every command and pipeline event sent before it has been handled.
    #[cfg(test)]
    pub(crate) async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(PlayerCommand::Flush { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

impl fmt::Debug for AudioPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPlayer")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}
