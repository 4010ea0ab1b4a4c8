use serde::{Deserialize, Serialize};

use crate::audio::constants::DEFAULT_SILENCE_PADDING_FRAMES;

/// What a `Playing` player does once its last subscribed connection leaves.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoSubscriberBehavior {
    /// Suspend scheduling (`AutoPaused`) until a connection is available again.
    #[default]
    Pause,
    /// Keep consuming frames as if nothing happened.
    Play,
    /// Tear down to `Idle`.
    Stop,
}

/// `[player]`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlayerConfig {
    #[serde(default)]
    pub no_subscriber: NoSubscriberBehavior,
    /// Zeroed frames sent after the end of a stream.
    #[serde(default = "default_silence_padding_frames")]
    pub silence_padding_frames: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            no_subscriber: NoSubscriberBehavior::default(),
            silence_padding_frames: default_silence_padding_frames(),
        }
    }
}

fn default_silence_padding_frames() -> u32 {
    DEFAULT_SILENCE_PADDING_FRAMES
}
