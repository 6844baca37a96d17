//! Audio decoding, looping render and output

mod buffer;
mod convert;
mod engine;
mod loader;
mod renderer;
mod source;

pub use buffer::DecodedAudio;
pub use convert::StreamConverter;
pub use engine::{
    EngineConfig, EngineEvent, EngineState, PlaybackEngine, DEFAULT_FRAMES_PER_SLICE,
    MAX_FRAMES_PER_SLICE,
};
pub use loader::{Loader, MAX_CHUNK_FRAMES};
pub use renderer::LoopRenderer;
pub use source::{AudioSource, FileSource};

/// Size in bytes of one 32-bit float sample
pub const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

/// Fixed playback format: 44.1kHz stereo 32-bit float, interleaved
pub const TARGET_FORMAT: TargetFormat = TargetFormat {
    sample_rate: 44_100,
    channels: 2,
    interleaved: true,
};

/// PCM format all decoded audio is normalized to
///
/// Samples are always 32-bit float. With `interleaved` set, the decoded audio
/// lives in a single buffer; otherwise there is one buffer per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved: bool,
}

impl TargetFormat {
    /// Bytes per frame across all channels
    pub const fn frame_size(&self) -> usize {
        self.channels as usize * SAMPLE_SIZE
    }

    /// Number of separate sample buffers this layout uses
    pub const fn buffer_count(&self) -> usize {
        if self.interleaved {
            1
        } else {
            self.channels as usize
        }
    }

    /// Samples per frame stored in each buffer
    pub const fn channels_per_buffer(&self) -> usize {
        if self.interleaved {
            self.channels as usize
        } else {
            1
        }
    }

    /// Calculate bytes for given number of frames
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.frame_size()
    }

    /// Expected frame count after converting `native_frames` recorded at
    /// `native_rate` to this format's rate, rounded up
    ///
    /// Saturates at `u64::MAX` when the length reported by a container is
    /// too large to represent, so callers sizing buffers from it fail.
    pub fn output_frames_for(&self, native_frames: u64, native_rate: u32) -> u64 {
        if native_rate == 0 {
            return 0;
        }
        let scaled = native_frames as u128 * self.sample_rate as u128;
        u64::try_from(scaled.div_ceil(native_rate as u128)).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz {}ch f32 {}",
            self.sample_rate,
            self.channels,
            if self.interleaved { "interleaved" } else { "planar" }
        )
    }
}

/// Native format of a source file, as reported by its container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: String,
    pub bits_per_sample: Option<u32>,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz {}ch {}", self.sample_rate, self.channels, self.codec)?;
        if let Some(bits) = self.bits_per_sample {
            write!(f, " {}bit", bits)?;
        }
        Ok(())
    }
}
