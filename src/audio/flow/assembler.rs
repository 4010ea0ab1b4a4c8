//! `FrameAssembler`: re-frames arbitrary PCM byte chunks into fixed frames.
//!
//! Transcoder stdout arrives in chunks whose boundaries have nothing to do with
//! frame boundaries. The assembler keeps at most `frame_bytes - 1` bytes of
//! carry-over between calls and emits every complete window in order.

use crate::audio::frame::{Frame, PcmFormat};

pub struct FrameAssembler {
    frame_bytes: usize,
    /// Partial trailing window from the previous chunk.
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(format: &PcmFormat) -> Self {
        let frame_bytes = format.frame_bytes();
        Self {
            frame_bytes,
            pending: Vec::with_capacity(frame_bytes),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Bytes currently held back waiting for the rest of a frame.
    pub fn carry_len(&self) -> usize {
        self.pending.len()
    }

    /// Consumes one chunk and returns the frames it completed, in decode order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut input = chunk;

        if !self.pending.is_empty() {
            let needed = self.frame_bytes - self.pending.len();
            if input.len() < needed {
                self.pending.extend_from_slice(input);
                return frames;
            }
            self.pending.extend_from_slice(&input[..needed]);
            frames.push(Frame::from_le_bytes(&self.pending));
            self.pending.clear();
            input = &input[needed..];
        }

        let mut windows = input.chunks_exact(self.frame_bytes);
        frames.extend(windows.by_ref().map(Frame::from_le_bytes));
        self.pending.extend_from_slice(windows.remainder());

        frames
    }

    /// End of stream: the trailing partial frame is discarded.
    /// Returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FORMAT: PcmFormat = PcmFormat::new(48_000, 2, 20);

    fn pcm_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn holds_back_until_a_full_frame_arrives() {
        let mut assembler = FrameAssembler::new(&FORMAT);
        let bytes = pcm_bytes(3840 * 2);

        let mut offset = 0;
        for size in [500, 1200, 37] {
            assert!(assembler.push(&bytes[offset..offset + size]).is_empty());
            offset += size;
        }
        assert_eq!(assembler.carry_len(), 1737);

        let frames = assembler.push(&bytes[offset..3840]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], Frame::from_le_bytes(&bytes[..3840]));
        assert_eq!(assembler.carry_len(), 0);
    }

    #[test]
    fn odd_byte_split_inside_a_sample() {
        let mut assembler = FrameAssembler::new(&FORMAT);
        let bytes = pcm_bytes(3840);

        assert!(assembler.push(&bytes[..3]).is_empty());
        let frames = assembler.push(&bytes[3..]);
        assert_eq!(frames, vec![Frame::from_le_bytes(&bytes)]);
    }

    #[test]
    fn finish_drops_partial_tail() {
        let mut assembler = FrameAssembler::new(&FORMAT);
        let frames = assembler.push(&pcm_bytes(3840 + 100));
        assert_eq!(frames.len(), 1);
        assert_eq!(assembler.finish(), 100);
        assert_eq!(assembler.carry_len(), 0);
    }

    proptest! {
        #[test]
        fn rechunking_never_changes_the_frames(
            frame_count in 0usize..6,
            cuts in proptest::collection::vec(1usize..5000, 0..24),
        ) {
            let bytes = pcm_bytes(frame_count * FORMAT.frame_bytes());
            let expected: Vec<Frame> = bytes
                .chunks_exact(FORMAT.frame_bytes())
                .map(Frame::from_le_bytes)
                .collect();

            let mut assembler = FrameAssembler::new(&FORMAT);
            let mut produced = Vec::new();
            let mut offset = 0;
            for cut in cuts {
                if offset >= bytes.len() {
                    break;
                }
                let end = (offset + cut).min(bytes.len());
                produced.extend(assembler.push(&bytes[offset..end]));
                prop_assert!(assembler.carry_len() < FORMAT.frame_bytes());
                offset = end;
            }
            produced.extend(assembler.push(&bytes[offset..]));

            prop_assert_eq!(produced, expected);
            prop_assert_eq!(assembler.carry_len(), 0);
        }
    }
}
