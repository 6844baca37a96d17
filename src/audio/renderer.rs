//! Real-time loop renderer driven by the output callback

use crate::audio::DecodedAudio;
use crate::error::{LoopError, Result};
use std::sync::Arc;

/// Playback state owned by the render callback
///
/// Pairs the decoded audio with a frame cursor. Once moved into the output
/// stream's callback, only the audio thread touches the cursor. The
/// callback holds its own `Arc`, so the samples outlive every invocation.
pub struct LoopRenderer {
    audio: Arc<DecodedAudio>,
    cursor: usize,
    frame_count: usize,
    channels: usize,
}

impl LoopRenderer {
    /// Create a renderer positioned at frame 0
    ///
    /// Refuses empty audio: there is no frame to wrap back to.
    pub fn new(audio: Arc<DecodedAudio>) -> Result<Self> {
        let frame_count = audio.frame_count();
        if frame_count == 0 {
            return Err(LoopError::EmptyAudio);
        }
        let channels = audio.format().channels as usize;

        Ok(Self {
            audio,
            cursor: 0,
            frame_count,
            channels,
        })
    }

    /// Current read position in frames
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of frames in one loop iteration
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Fill `out` (interleaved, playback channel count) with the next frames
    ///
    /// Writes exactly `out.len() / channels` frames, wrapping to the start of
    /// the audio as many times as needed. Samples past the last whole frame
    /// are silenced. Never allocates, locks or blocks.
    pub fn render(&mut self, out: &mut [f32]) {
        let channels = self.channels;
        let requested = out.len() / channels;
        let (out, partial) = out.split_at_mut(requested * channels);
        partial.fill(0.0);

        if self.audio.format().interleaved {
            let input = &self.audio.buffers()[0][..self.frame_count * channels];
            let mut written = 0;
            while written < requested {
                let run = (requested - written).min(self.frame_count - self.cursor);
                let src = &input[self.cursor * channels..(self.cursor + run) * channels];
                out[written * channels..(written + run) * channels].copy_from_slice(src);
                written += run;
                self.cursor = (self.cursor + run) % self.frame_count;
            }
        } else {
            let buffers = self.audio.buffers();
            for frame in out.chunks_exact_mut(channels) {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample = buffers[ch][self.cursor];
                }
                self.cursor = (self.cursor + 1) % self.frame_count;
            }
        }
    }
}
