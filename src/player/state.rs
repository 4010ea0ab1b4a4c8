use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use crate::{audio::AudioResource, common::errors::PlayerError};

/// Lifecycle of an [`AudioPlayer`](super::AudioPlayer).
///
/// Every non-idle state carries the resource it is working on.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PlayerState {
    #[default]
    Idle,
    /// Waiting for the jitter buffer to reach its start watermark.
    Buffering { resource: AudioResource },
    Playing { resource: AudioResource },
    /// Paused by the caller.
    Paused { resource: AudioResource },
    /// Paused because no connection is left to play to.
    AutoPaused { resource: AudioResource },
}

impl PlayerState {
    pub fn status(&self) -> PlayerStatus {
        match self {
            Self::Idle => PlayerStatus::Idle,
            Self::Buffering { .. } => PlayerStatus::Buffering,
            Self::Playing { .. } => PlayerStatus::Playing,
            Self::Paused { .. } => PlayerStatus::Paused,
            Self::AutoPaused { .. } => PlayerStatus::AutoPaused,
        }
    }

    pub fn resource(&self) -> Option<&AudioResource> {
        match self {
            Self::Idle => None,
            Self::Buffering { resource }
            | Self::Playing { resource }
            | Self::Paused { resource }
            | Self::AutoPaused { resource } => Some(resource),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Fieldless view of [`PlayerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
    AutoPaused,
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    StateChange {
        old: PlayerState,
        new: PlayerState,
    },
    Error {
        resource: Option<AudioResource>,
        error: PlayerError,
    },
}

/// Counters updated by the player task and readable from any handle.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    frames_submitted: AtomicU64,
    silence_frames: AtomicU64,
    frames_dropped: AtomicU64,
    underruns: AtomicU64,
    submit_errors: AtomicU64,
    buffered_frames: AtomicUsize,
}

impl PlaybackStats {
    pub(crate) fn record_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_silence(&self) {
        self.silence_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submit_error(&self) {
        self.submit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_buffered(&self, frames: usize) {
        self.buffered_frames.store(frames, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            submit_errors: self.submit_errors.load(Ordering::Relaxed),
            buffered_frames: self.buffered_frames.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PlaybackStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Audio frames taken from the buffer and handed to the transport.
    pub frames_submitted: u64,
    /// Padding frames sent after natural end of stream.
    pub silence_frames: u64,
    /// Frames evicted by jitter buffer overflow.
    pub frames_dropped: u64,
    pub underruns: u64,
    pub submit_errors: u64,
    pub buffered_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_variant() {
        let resource = AudioResource::from_locator("https://example.com/a.mp3").unwrap();
        let state = PlayerState::AutoPaused {
            resource: resource.clone(),
        };
        assert_eq!(state.status(), PlayerStatus::AutoPaused);
        assert_eq!(state.resource(), Some(&resource));
        assert!(PlayerState::default().is_idle());
        assert_eq!(PlayerState::Idle.resource(), None);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let stats = PlaybackStats::default();
        stats.record_submitted();
        stats.record_underrun();
        stats.set_buffered(12);

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["framesSubmitted"], 1);
        assert_eq!(json["underruns"], 1);
        assert_eq!(json["bufferedFrames"], 12);
    }
}
