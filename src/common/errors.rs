//! Error taxonomy for the playback engine.
//!
//! Every error is `Clone` so it can be carried on broadcast channels; nothing
//! here crosses a task boundary as a panic or an unobserved `Err`.

use thiserror::Error;

/// Raised synchronously while building an [`AudioResource`](crate::audio::AudioResource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("unsupported input: only string locators can be played")]
    UnsupportedInput,
    #[error("resource locator is empty")]
    EmptyLocator,
}

/// Failures of the external decode pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("failed to spawn {tool}: {reason}")]
    Spawn { tool: String, reason: String },
    #[error("failed to pipe resolver output into transcoder: {0}")]
    Pipe(String),
    #[error("pipeline i/o error: {0}")]
    Io(String),
    #[error("pipeline failed to produce audio")]
    NoAudio,
}

/// Failures of the media transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(String),
    #[error("transport session lost: {0}")]
    Lost(String),
    #[error("frame submission failed: {0}")]
    Submit(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("cannot play a resource that has already ended")]
    ResourceEnded,
    #[error("audio player task is no longer running")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("voice connection has been destroyed")]
    Destroyed,
    #[error("signalling adapter rejected the request: {0}")]
    Signalling(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
