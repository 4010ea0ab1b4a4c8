use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};

use crate::audio::constants::BYTES_PER_SAMPLE;

/// Fixed PCM layout shared by the transcoder output, the assembler and the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u32,
}

impl PcmFormat {
    pub const fn new(sample_rate: u32, channels: u16, frame_duration_ms: u32) -> Self {
        Self {
            sample_rate,
            channels,
            frame_duration_ms,
        }
    }

    /// Samples per channel in one frame (960 at 48 kHz / 20 ms).
    pub fn samples_per_channel(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Interleaved samples in one frame.
    pub fn frame_samples(&self) -> usize {
        self.samples_per_channel() * self.channels as usize
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_samples() * BYTES_PER_SAMPLE
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }
}

/// One frame of interleaved signed 16-bit PCM. Immutable once assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Box<[i16]>,
}

impl Frame {
    /// Decodes exactly one frame worth of little-endian bytes.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut samples = vec![0i16; bytes.len() / BYTES_PER_SAMPLE];
        LittleEndian::read_i16_into(&bytes[..samples.len() * BYTES_PER_SAMPLE], &mut samples);
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn silence(format: &PcmFormat) -> Self {
        Self::from_samples(vec![0; format.frame_samples()])
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns a copy with every sample multiplied by `gain`, saturating at the i16 range.
    pub fn with_gain(&self, gain: f32) -> Self {
        let samples = self
            .samples
            .iter()
            .map(|&s| (s as f32 * gain).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect();
        Self { samples }
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.samples.len() * BYTES_PER_SAMPLE];
        LittleEndian::write_i16_into(&self.samples, &mut out);
        out
    }
}
