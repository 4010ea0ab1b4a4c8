use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::constants::{
    DEFAULT_CORRECTIVE_DELAY_MS, DEFAULT_INITIAL_TIMEOUT_MS, DEFAULT_LOW_FRAMES,
    DEFAULT_MAX_CAPACITY_FRAMES, DEFAULT_MIN_START_FRAMES, DEFAULT_TARGET_FRAMES,
    DEFAULT_UNDERRUN_RETRY_MS,
};

/// `[buffer]`: jitter buffer watermarks (in frames) and scheduler timings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BufferConfig {
    /// Frames required before the first frame is scheduled.
    #[serde(default = "default_min_start")]
    pub min_start_frames: usize,
    /// Desired steady-state length.
    #[serde(default = "default_target")]
    pub target_frames: usize,
    /// Below this length the scheduler applies corrective pacing.
    #[serde(default = "default_low")]
    pub low_frames: usize,
    /// Hard bound; pushing past it drops the oldest frame.
    #[serde(default = "default_max_capacity")]
    pub max_capacity_frames: usize,
    /// How long `Buffering` may wait for `min_start_frames`.
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,
    #[serde(default = "default_underrun_retry_ms")]
    pub underrun_retry_ms: u64,
    #[serde(default = "default_corrective_delay_ms")]
    pub corrective_delay_ms: u64,
}

impl BufferConfig {
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn underrun_retry(&self) -> Duration {
        Duration::from_millis(self.underrun_retry_ms)
    }

    pub fn corrective_delay(&self) -> Duration {
        Duration::from_millis(self.corrective_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_start_frames == 0 {
            return Err("buffer.min_start_frames must be at least 1".into());
        }
        if self.min_start_frames > self.max_capacity_frames {
            return Err(format!(
                "buffer.min_start_frames ({}) exceeds buffer.max_capacity_frames ({})",
                self.min_start_frames, self.max_capacity_frames
            ));
        }
        if self.low_frames > self.target_frames || self.target_frames > self.max_capacity_frames {
            return Err(format!(
                "buffer watermarks must satisfy low <= target <= max_capacity (got {} / {} / {})",
                self.low_frames, self.target_frames, self.max_capacity_frames
            ));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_start_frames: default_min_start(),
            target_frames: default_target(),
            low_frames: default_low(),
            max_capacity_frames: default_max_capacity(),
            initial_timeout_ms: default_initial_timeout_ms(),
            underrun_retry_ms: default_underrun_retry_ms(),
            corrective_delay_ms: default_corrective_delay_ms(),
        }
    }
}

fn default_min_start() -> usize {
    DEFAULT_MIN_START_FRAMES
}

fn default_target() -> usize {
    DEFAULT_TARGET_FRAMES
}

fn default_low() -> usize {
    DEFAULT_LOW_FRAMES
}

fn default_max_capacity() -> usize {
    DEFAULT_MAX_CAPACITY_FRAMES
}

fn default_initial_timeout_ms() -> u64 {
    DEFAULT_INITIAL_TIMEOUT_MS
}

fn default_underrun_retry_ms() -> u64 {
    DEFAULT_UNDERRUN_RETRY_MS
}

fn default_corrective_delay_ms() -> u64 {
    DEFAULT_CORRECTIVE_DELAY_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BufferConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let config = BufferConfig {
            low_frames: 200,
            target_frames: 100,
            ..BufferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_min_start() {
        let config = BufferConfig {
            min_start_frames: 0,
            ..BufferConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
