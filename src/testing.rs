//! In-process fakes for the decode, transport and signalling collaborators.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    audio::{
        AudioResource, Frame, PcmFormat, PipelineEvent, PipelineExit, PipelineHandle,
        PipelineSpawner,
    },
    common::errors::{PipelineError, TransportError},
    voice::{MediaSession, MediaTransport, SignallingAdapter, VoiceServerInfo, VoiceStateRequest},
};

pub(crate) const FORMAT: PcmFormat = PcmFormat::new(48_000, 2, 20);

/// Little-endian bytes for `count` frames whose samples all equal `sample`.
pub(crate) fn frame_bytes(count: usize, sample: i16) -> Vec<u8> {
    let frame = Frame::from_samples(vec![sample; FORMAT.frame_samples()]).to_le_bytes();
    frame.repeat(count)
}

/// One pipeline handed out by [`ScriptedSpawner`]; the test plays the decoder.
#[derive(Clone)]
pub(crate) struct ScriptedPipeline {
    pub resource: AudioResource,
    pub generation: u64,
    pub events: flume::Sender<PipelineEvent>,
    pub cancel: CancellationToken,
}

impl ScriptedPipeline {
    /// Queues without waiting; a full queue means the test outran the player.
    fn deliver(&self, event: PipelineEvent) {
        if let Err(flume::TrySendError::Full(_)) = self.events.try_send(event) {
            panic!("pipeline event queue is full");
        }
    }

    pub fn send_bytes(&self, bytes: Vec<u8>) {
        self.deliver(PipelineEvent::data(self.generation, Bytes::from(bytes)));
    }

    pub fn send_frames(&self, count: usize, sample: i16) {
        self.send_bytes(frame_bytes(count, sample));
    }

    pub fn close(&self) {
        self.deliver(PipelineEvent::closed(self.generation, PipelineExit::Clean));
    }

    pub fn fail(&self, error: PipelineError) {
        self.deliver(PipelineEvent::error(self.generation, error));
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Default)]
pub(crate) struct ScriptedSpawner {
    spawned: Mutex<Vec<ScriptedPipeline>>,
    fail_next: Mutex<Option<PipelineError>>,
}

impl ScriptedSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, error: PipelineError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn pipeline(&self, index: usize) -> ScriptedPipeline {
        self.spawned.lock()[index].clone()
    }

    pub fn last(&self) -> ScriptedPipeline {
        self.spawned
            .lock()
            .last()
            .cloned()
            .expect("no pipeline spawned")
    }
}

impl PipelineSpawner for ScriptedSpawner {
    fn spawn(
        &self,
        resource: &AudioResource,
        generation: u64,
        events: flume::Sender<PipelineEvent>,
    ) -> Result<PipelineHandle, PipelineError> {
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { token.cancelled().await });
        self.spawned.lock().push(ScriptedPipeline {
            resource: resource.clone(),
            generation,
            events,
            cancel: cancel.clone(),
        });
        Ok(PipelineHandle::new(cancel, task))
    }
}

/// Records every submitted frame with its (possibly simulated) submission time.
#[derive(Default)]
pub(crate) struct RecordingSession {
    frames: Mutex<Vec<(Instant, Frame)>>,
    failing: AtomicBool,
    closed: CancellationToken,
}

impl RecordingSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.frames.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Simulates the remote end going away.
    pub fn drop_session(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl MediaSession for RecordingSession {
    async fn submit_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Submit("simulated failure".into()));
        }
        self.frames.lock().push((Instant::now(), frame.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
    }

    async fn closed(&self) -> TransportError {
        self.closed.cancelled().await;
        TransportError::Lost("session closed".into())
    }
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    connects: Mutex<Vec<VoiceServerInfo>>,
    sessions: Mutex<Vec<Arc<RecordingSession>>>,
    fail_next: Mutex<Option<TransportError>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, error: TransportError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn connects(&self) -> Vec<VoiceServerInfo> {
        self.connects.lock().clone()
    }

    pub fn session(&self, index: usize) -> Arc<RecordingSession> {
        self.sessions.lock()[index].clone()
    }
}

#[async_trait]
impl MediaTransport for RecordingTransport {
    async fn connect(&self, info: &VoiceServerInfo) -> Result<Arc<dyn MediaSession>, TransportError> {
        self.connects.lock().push(info.clone());
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        let session = RecordingSession::new();
        self.sessions.lock().push(session.clone());
        Ok(session as Arc<dyn MediaSession>)
    }
}

pub(crate) struct RecordingSignalling {
    requests: Mutex<Vec<VoiceStateRequest>>,
    available: AtomicBool,
    destroyed: AtomicBool,
}

impl RecordingSignalling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn requests(&self) -> Vec<VoiceStateRequest> {
        self.requests.lock().clone()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl SignallingAdapter for RecordingSignalling {
    fn send_voice_state(&self, request: &VoiceStateRequest) -> bool {
        if !self.available.load(Ordering::SeqCst) {
            return false;
        }
        self.requests.lock().push(request.clone());
        true
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}
