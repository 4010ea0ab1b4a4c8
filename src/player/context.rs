use std::{collections::HashMap, sync::Arc};

use tokio::{
    sync::{broadcast, oneshot, watch},
    time::Instant,
};
use tracing::{debug, trace};

use super::{
    manager::{begin_playing, fail_current, start_pipeline, tick},
    pacer::FramePacer,
    state::{PlaybackStats, PlayerEvent, PlayerState},
};
use crate::{
    audio::{
        AudioResource, BufferHealth, FrameAssembler, JitterBuffer, PcmFormat, PipelineEvent,
        PipelineEventKind, PipelineHandle, PipelineSpawner, constants::PIPELINE_EVENT_CAPACITY,
    },
    common::{
        errors::{PipelineError, PlayerError},
        types::{ConnectionId, PlayerId},
    },
    configs::{BufferConfig, Config, NoSubscriberBehavior, PlayerConfig},
    voice::MediaSession,
};

pub(crate) enum PlayerCommand {
    Play {
        resource: AudioResource,
        reply: oneshot::Sender<Result<(), PlayerError>>,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Unpause {
        reply: oneshot::Sender<bool>,
    },
    Stop {
        force: bool,
        reply: oneshot::Sender<bool>,
    },
    /// A connection subscribed; `session` is set if it is already ready.
    Attach {
        id: ConnectionId,
        session: Option<Arc<dyn MediaSession>>,
    },
    Detach {
        id: ConnectionId,
    },
    SessionReady {
        id: ConnectionId,
        session: Arc<dyn MediaSession>,
    },
    SessionLost {
        id: ConnectionId,
    },
    #[cfg(test)]
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Everything one player owns. Lives inside a single task; see [`PlayerContext::run`].
pub struct PlayerContext {
    pub id: PlayerId,
    pub format: PcmFormat,
    pub buffer_config: BufferConfig,
    pub player_config: PlayerConfig,
    pub spawner: Arc<dyn PipelineSpawner>,

    pub state: PlayerState,
    /// Bumped on every teardown; pipeline events from older generations are stale.
    pub generation: u64,
    pub pipeline: Option<PipelineHandle>,
    pub pipeline_done: bool,
    pub frames_received: u64,
    pub assembler: FrameAssembler,
    pub buffer: JitterBuffer,
    pub pacer: FramePacer,
    pub health: BufferHealth,
    pub buffering_deadline: Option<Instant>,
    /// Pipeline output is only taken while the buffer holds fewer frames
    /// than this, leaving room for the largest chunk a read can produce.
    pub intake_limit: usize,
    /// Silence frames still to send after natural end; `None` until the end is reached.
    pub padding_left: Option<u32>,
    pub subscribers: HashMap<ConnectionId, Option<Arc<dyn MediaSession>>>,

    pub stats: Arc<PlaybackStats>,
    pub(crate) commands: flume::Receiver<PlayerCommand>,
    pub(crate) pipeline_tx: flume::Sender<PipelineEvent>,
    pipeline_rx: flume::Receiver<PipelineEvent>,
    state_tx: watch::Sender<PlayerState>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlayerContext {
    pub(crate) fn new(
        id: PlayerId,
        config: &Config,
        spawner: Arc<dyn PipelineSpawner>,
        commands: flume::Receiver<PlayerCommand>,
        state_tx: watch::Sender<PlayerState>,
        events: broadcast::Sender<PlayerEvent>,
        stats: Arc<PlaybackStats>,
    ) -> Self {
        let format = config.audio.format();
        let (pipeline_tx, pipeline_rx) = flume::bounded(PIPELINE_EVENT_CAPACITY);
        let intake_limit = intake_limit(
            config.buffer.max_capacity_frames,
            config.decoder.chunk_size,
            format.frame_bytes(),
        );

        Self {
            id,
            format,
            buffer_config: config.buffer.clone(),
            player_config: config.player.clone(),
            spawner,
            state: PlayerState::Idle,
            generation: 0,
            pipeline: None,
            pipeline_done: false,
            frames_received: 0,
            assembler: FrameAssembler::new(&format),
            buffer: JitterBuffer::new(config.buffer.max_capacity_frames),
            pacer: FramePacer::new(format.frame_interval()),
            health: BufferHealth::Starved,
            buffering_deadline: None,
            intake_limit,
            padding_left: None,
            subscribers: HashMap::new(),
            stats,
            commands,
            pipeline_tx,
            pipeline_rx,
            state_tx,
            events,
        }
    }

    /// Processes commands, frame ticks, the buffering timeout and pipeline
    /// output until every [`AudioPlayer`](super::AudioPlayer) handle is gone.
    pub async fn run(mut self) {
        debug!("[{}] player task started", self.id);

        loop {
            let tick_at = if matches!(self.state, PlayerState::Playing { .. }) {
                self.pacer.deadline()
            } else {
                None
            };
            let buffering_deadline = self.buffering_deadline;

            tokio::select! {
                biased;
                command = self.commands.recv_async() => match command {
                    Ok(command) => self.handle_command(command),
                    Err(_) => break,
                },
                _ = sleep_until_opt(tick_at) => tick(&mut self).await,
                _ = sleep_until_opt(buffering_deadline) => self.on_buffering_timeout(),
                Ok(event) = self.pipeline_rx.recv_async(), if self.has_intake_room() => {
                    self.on_pipeline_event(event)
                }
            }
        }

        self.go_idle();
        debug!("[{}] player task finished", self.id);
    }

    fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Play { resource, reply } => {
                let _ = reply.send(self.play(resource));
            }
            PlayerCommand::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            PlayerCommand::Unpause { reply } => {
                let _ = reply.send(self.unpause());
            }
            PlayerCommand::Stop { force, reply } => {
                let _ = reply.send(self.stop(force));
            }
            PlayerCommand::Attach { id, session } => {
                let ready = session.is_some();
                self.subscribers.insert(id, session);
                debug!("[{}] {} subscribed (ready: {})", self.id, id, ready);
                if ready {
                    self.on_session_ready();
                }
            }
            PlayerCommand::Detach { id } => {
                if self.subscribers.remove(&id).is_some() {
                    debug!("[{}] {} unsubscribed", self.id, id);
                    if self.subscribers.is_empty() {
                        self.on_last_subscriber_gone();
                    }
                }
            }
            PlayerCommand::SessionReady { id, session } => {
                if let Some(slot) = self.subscribers.get_mut(&id) {
                    *slot = Some(session);
                    self.on_session_ready();
                }
            }
            PlayerCommand::SessionLost { id } => {
                if let Some(slot) = self.subscribers.get_mut(&id) {
                    *slot = None;
                    debug!("[{}] session of {} lost", self.id, id);
                }
            }
            #[cfg(test)]
            PlayerCommand::Flush { reply } => {
                while self.has_intake_room() {
                    let Ok(event) = self.pipeline_rx.try_recv() else {
                        break;
                    };
                    self.on_pipeline_event(event);
                }
                let _ = reply.send(());
            }
        }
    }

    fn play(&mut self, resource: AudioResource) -> Result<(), PlayerError> {
        if resource.ended() {
            return Err(PlayerError::ResourceEnded);
        }

        if let Some(previous) = self.state.resource() {
            if !previous.ptr_eq(&resource) {
                previous.mark_ended();
            }
        }
        self.teardown();

        self.set_state(PlayerState::Buffering { resource });
        if self.has_ready_session() {
            start_pipeline(self);
        }
        Ok(())
    }

    fn pause(&mut self) -> bool {
        let resource = match &self.state {
            PlayerState::Playing { resource } | PlayerState::AutoPaused { resource } => {
                resource.clone()
            }
            _ => return false,
        };
        self.set_state(PlayerState::Paused { resource });
        true
    }

    fn unpause(&mut self) -> bool {
        let PlayerState::Paused { resource } = &self.state else {
            return false;
        };
        let resource = resource.clone();
        self.set_state(PlayerState::Playing { resource });
        self.pacer.start(Instant::now());
        true
    }

    fn stop(&mut self, force: bool) -> bool {
        if self.state.is_idle() {
            if force {
                self.teardown();
            }
            return false;
        }
        self.go_idle();
        true
    }

    fn on_session_ready(&mut self) {
        match &self.state {
            PlayerState::Buffering { .. } if self.pipeline.is_none() => start_pipeline(self),
            PlayerState::AutoPaused { resource } => {
                let resource = resource.clone();
                debug!("[{}] connection available again, resuming", self.id);
                self.set_state(PlayerState::Playing { resource });
                self.pacer.start(Instant::now());
            }
            _ => {}
        }
    }

    fn on_last_subscriber_gone(&mut self) {
        let PlayerState::Playing { resource } = &self.state else {
            return;
        };
        match self.player_config.no_subscriber {
            NoSubscriberBehavior::Pause => {
                let resource = resource.clone();
                self.set_state(PlayerState::AutoPaused { resource });
            }
            NoSubscriberBehavior::Stop => self.go_idle(),
            NoSubscriberBehavior::Play => {}
        }
    }

    fn on_pipeline_event(&mut self, event: PipelineEvent) {
        if event.generation != self.generation {
            trace!(
                "[{}] discarding event from stale pipeline {} (current {})",
                self.id, event.generation, self.generation
            );
            return;
        }

        match event.kind {
            PipelineEventKind::Data(bytes) => {
                for frame in self.assembler.push(&bytes) {
                    self.frames_received += 1;
                    if self.buffer.push(frame).is_some() {
                        self.stats.record_dropped();
                        debug!(
                            "[{}] jitter buffer full, dropped oldest frame ({} total)",
                            self.id,
                            self.buffer.dropped()
                        );
                    }
                }
                self.update_health();

                // A buffer too full to take more output counts as ready.
                let start_at = self.buffer_config.min_start_frames.min(self.intake_limit);
                if matches!(self.state, PlayerState::Buffering { .. })
                    && self.buffer.len() >= start_at
                {
                    begin_playing(self);
                }
            }
            PipelineEventKind::Closed(exit) => {
                self.pipeline_done = true;
                let discarded = self.assembler.finish();
                if discarded > 0 {
                    trace!("[{}] discarded {} trailing bytes", self.id, discarded);
                }
                debug!(
                    "[{}] pipeline finished ({:?}) after {} frames",
                    self.id, exit, self.frames_received
                );

                // Zero frames keeps waiting; the buffering timeout reports it.
                if matches!(self.state, PlayerState::Buffering { .. }) && !self.buffer.is_empty() {
                    begin_playing(self);
                }
            }
            PipelineEventKind::Error(error) => {
                fail_current(self, PlayerError::Pipeline(error));
            }
        }
    }

    fn on_buffering_timeout(&mut self) {
        self.buffering_deadline = None;
        if !matches!(self.state, PlayerState::Buffering { .. }) {
            return;
        }

        if self.buffer.is_empty() {
            fail_current(self, PlayerError::Pipeline(PipelineError::NoAudio));
        } else {
            debug!(
                "[{}] buffering timed out with {} of {} frames, starting anyway",
                self.id,
                self.buffer.len(),
                self.buffer_config.min_start_frames
            );
            begin_playing(self);
        }
    }

    pub fn has_intake_room(&self) -> bool {
        self.buffer.len() < self.intake_limit
    }

    pub fn has_ready_session(&self) -> bool {
        self.subscribers.values().any(Option::is_some)
    }

    pub fn ready_sessions(&self) -> Vec<Arc<dyn MediaSession>> {
        self.subscribers.values().flatten().cloned().collect()
    }

    pub fn update_health(&mut self) {
        self.stats.set_buffered(self.buffer.len());
        let health = BufferHealth::classify(self.buffer.len(), &self.buffer_config);
        if health != self.health {
            debug!(
                "[{}] buffer health {:?} -> {:?} ({} frames)",
                self.id,
                self.health,
                health,
                self.buffer.len()
            );
            self.health = health;
        }
    }

    pub fn set_state(&mut self, new: PlayerState) {
        let old = std::mem::replace(&mut self.state, new.clone());
        debug!(
            "[{}] state {:?} -> {:?}",
            self.id,
            old.status(),
            new.status()
        );
        self.state_tx.send_replace(new.clone());
        let _ = self.events.send(PlayerEvent::StateChange { old, new });
    }

    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    /// Kills the pipeline and clears buffered audio and timing state.
    pub fn teardown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.kill();
        }
        self.generation += 1;
        self.pipeline_done = false;
        self.frames_received = 0;
        self.assembler.reset();
        self.buffer.clear();
        self.pacer.reset();
        self.buffering_deadline = None;
        self.padding_left = None;
        self.update_health();
    }

    /// Tears down and moves to `Idle`, ending the current resource.
    pub fn go_idle(&mut self) {
        self.teardown();
        if let Some(resource) = self.state.resource() {
            resource.mark_ended();
        }
        if !self.state.is_idle() {
            self.set_state(PlayerState::Idle);
        }
    }
}

/// Highest buffer length at which one more chunk of `chunk_size` bytes, plus
/// a frame completed from carried-over bytes, still fits in `capacity`.
/// Reads are sized by the codec buffer, so twice the nominal chunk is allowed.
fn intake_limit(capacity: usize, chunk_size: usize, frame_bytes: usize) -> usize {
    let chunk_frames = chunk_size.div_ceil(frame_bytes.max(1));
    capacity.saturating_sub(2 * chunk_frames + 1).max(1)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
