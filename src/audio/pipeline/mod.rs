//! Decode pipeline adapter.
//!
//! Turns one [`AudioResource`] into a stream of raw PCM chunks plus
//! termination signals, delivered to the owning player as [`PipelineEvent`]s.
//! Every event is stamped with the player's generation so output of a
//! pipeline that has since been replaced or stopped can be discarded.

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{audio::resource::AudioResource, common::errors::PipelineError};

pub mod classify;
pub mod command;
pub mod process;

pub use classify::{LocatorClassifier, LocatorKind};
pub use command::{CommandSpec, TranscoderInput};
pub use process::{ManagedProcess, ProcessSpawner};

/// How the transcoder (and resolver, if any) terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    Clean,
    Failed {
        code: Option<i32>,
        diagnostics: String,
    },
}

#[derive(Debug)]
pub enum PipelineEventKind {
    Data(Bytes),
    /// No more data will follow.
    Closed(PipelineExit),
    /// Process-level failure; no more data will follow.
    Error(PipelineError),
}

#[derive(Debug)]
pub struct PipelineEvent {
    pub generation: u64,
    pub kind: PipelineEventKind,
}

impl PipelineEvent {
    pub fn data(generation: u64, bytes: Bytes) -> Self {
        Self {
            generation,
            kind: PipelineEventKind::Data(bytes),
        }
    }

    pub fn closed(generation: u64, exit: PipelineExit) -> Self {
        Self {
            generation,
            kind: PipelineEventKind::Closed(exit),
        }
    }

    pub fn error(generation: u64, error: PipelineError) -> Self {
        Self {
            generation,
            kind: PipelineEventKind::Error(error),
        }
    }
}

type KillHook = Box<dyn Fn() + Send + Sync>;

/// Owning handle to a running pipeline. Dropping it kills the pipeline.
pub struct PipelineHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    on_kill: Option<KillHook>,
}

impl PipelineHandle {
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
            on_kill: None,
        }
    }

    /// Runs `hook` inside [`kill`](Self::kill), before the supervising task
    /// gets a chance to observe the cancellation.
    pub fn on_kill(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_kill = Some(Box::new(hook));
        self
    }

    /// Terminates every process in the pipeline. Idempotent.
    pub fn kill(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Some(hook) = &self.on_kill {
            hook();
        }
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the supervising task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Starts a decode pipeline for a resource.
///
/// Implementations must not block beyond process-spawn cost and must report
/// everything after a successful spawn through `events`.
pub trait PipelineSpawner: Send + Sync + 'static {
    fn spawn(
        &self,
        resource: &AudioResource,
        generation: u64,
        events: flume::Sender<PipelineEvent>,
    ) -> Result<PipelineHandle, PipelineError>;
}
