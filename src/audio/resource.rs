//! `AudioResource`, one playable input.
//!
//! A resource is cheap to clone; every clone observes the same volume and
//! lifecycle flags, so callers keep a clone after handing one to
//! [`AudioPlayer::play`](crate::player::AudioPlayer::play).

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::common::errors::ResourceError;

/// Declared encoding of the bytes behind a locator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamType {
    /// Let the transcoder probe the input.
    #[default]
    Arbitrary,
    /// Already signed 16-bit little-endian PCM in the output format.
    Raw,
    OggOpus,
    WebmOpus,
}

/// What a caller may hand to [`AudioResource::new`].
pub enum ResourceInput {
    Locator(String),
    /// Live byte streams are rejected at construction.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for ResourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locator(s) => f.debug_tuple("Locator").field(s).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for ResourceInput {
    fn from(s: String) -> Self {
        Self::Locator(s)
    }
}

impl From<&str> for ResourceInput {
    fn from(s: &str) -> Self {
        Self::Locator(s.to_owned())
    }
}

#[derive(Debug, Clone)]
pub struct ResourceOptions {
    pub stream_type: StreamType,
    pub volume: f32,
    pub metadata: serde_json::Value,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            stream_type: StreamType::Arbitrary,
            volume: 1.0,
            metadata: serde_json::Value::Null,
        }
    }
}

struct ResourceInner {
    source: String,
    stream_type: StreamType,
    metadata: serde_json::Value,
    volume: AtomicU32, // f32 bits
    started: AtomicBool,
    ended: AtomicBool,
    played_ms: AtomicU64,
}

#[derive(Clone)]
pub struct AudioResource {
    inner: Arc<ResourceInner>,
}

impl AudioResource {
    pub fn new(
        input: impl Into<ResourceInput>,
        options: ResourceOptions,
    ) -> Result<Self, ResourceError> {
        let source = match input.into() {
            ResourceInput::Locator(source) => source,
            ResourceInput::Stream(_) => return Err(ResourceError::UnsupportedInput),
        };
        if source.trim().is_empty() {
            return Err(ResourceError::EmptyLocator);
        }

        Ok(Self {
            inner: Arc::new(ResourceInner {
                source,
                stream_type: options.stream_type,
                metadata: options.metadata,
                volume: AtomicU32::new(clamp_volume(options.volume).to_bits()),
                started: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                played_ms: AtomicU64::new(0),
            }),
        })
    }

    pub fn from_locator(locator: impl Into<String>) -> Result<Self, ResourceError> {
        Self::new(ResourceInput::Locator(locator.into()), ResourceOptions::default())
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn stream_type(&self) -> StreamType {
        self.inner.stream_type
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.inner.metadata
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.inner.volume.load(Ordering::Acquire))
    }

    /// Clamps into `[0, 1]`; NaN is treated as silence.
    pub fn set_volume(&self, volume: f32) {
        self.inner
            .volume
            .store(clamp_volume(volume).to_bits(), Ordering::Release);
    }

    /// True once the first frame of this resource has been scheduled.
    pub fn started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// True once a player has finished with this resource, for any reason.
    pub fn ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Audio submitted so far.
    pub fn playback_duration(&self) -> Duration {
        Duration::from_millis(self.inner.played_ms.load(Ordering::Acquire))
    }

    pub(crate) fn mark_started(&self) {
        self.inner.started.store(true, Ordering::Release);
    }

    pub(crate) fn mark_ended(&self) {
        self.inner.ended.store(true, Ordering::Release);
    }

    pub(crate) fn add_played(&self, interval: Duration) {
        self.inner
            .played_ms
            .fetch_add(interval.as_millis() as u64, Ordering::AcqRel);
    }

    /// Whether two handles refer to the same resource.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("source", &self.inner.source)
            .field("stream_type", &self.inner.stream_type)
            .field("volume", &self.volume())
            .field("started", &self.started())
            .field("ended", &self.ended())
            .finish()
    }
}

impl PartialEq for AudioResource {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
