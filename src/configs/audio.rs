use serde::{Deserialize, Serialize};

use crate::audio::constants::{DEFAULT_CHANNELS, DEFAULT_FRAME_DURATION_MS, DEFAULT_SAMPLE_RATE};
use crate::audio::PcmFormat;

/// `[audio]`: the fixed PCM format produced by the transcoder and moved per frame.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,
}

impl AudioConfig {
    pub fn format(&self) -> PcmFormat {
        PcmFormat::new(self.sample_rate, self.channels, self.frame_duration_ms)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            frame_duration_ms: default_frame_duration_ms(),
        }
    }
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_channels() -> u16 {
    DEFAULT_CHANNELS
}

fn default_frame_duration_ms() -> u32 {
    DEFAULT_FRAME_DURATION_MS
}
