//! Owned in-memory storage for fully decoded audio

use crate::audio::TargetFormat;
use crate::error::{LoopError, Result};

/// Decoded audio in the playback format
///
/// Holds one buffer per channel group (a single buffer for interleaved
/// formats). Buffers are sized for `capacity_frames` and zero-initialized;
/// only the first `frame_count` frames are played. Anything past
/// `frame_count` stays silent.
#[derive(Debug)]
pub struct DecodedAudio {
    format: TargetFormat,
    buffers: Vec<Box<[f32]>>,
    capacity_frames: usize,
    frame_count: usize,
}

impl DecodedAudio {
    /// Allocate zeroed buffers for `capacity_frames` frames of `format`
    ///
    /// Fails with [`LoopError::Allocation`] instead of aborting when memory is
    /// exhausted. Buffers allocated before the failing one are released on
    /// return.
    pub fn allocate(format: TargetFormat, capacity_frames: usize) -> Result<Self> {
        let samples_per_buffer = capacity_frames
            .checked_mul(format.channels_per_buffer())
            .ok_or(LoopError::Allocation { bytes: usize::MAX })?;
        let bytes_per_buffer = samples_per_buffer.saturating_mul(crate::audio::SAMPLE_SIZE);

        let mut buffers = Vec::new();
        buffers
            .try_reserve_exact(format.buffer_count())
            .map_err(|_| LoopError::Allocation {
                bytes: format.buffer_count() * std::mem::size_of::<Box<[f32]>>(),
            })?;

        for _ in 0..format.buffer_count() {
            buffers.push(zeroed_samples(samples_per_buffer, bytes_per_buffer)?);
        }

        Ok(Self {
            format,
            buffers,
            capacity_frames,
            frame_count: 0,
        })
    }

    /// Build decoded audio directly from interleaved samples
    ///
    /// Trailing samples that do not make up a whole frame are dropped.
    #[cfg(test)]
    pub(crate) fn from_interleaved(format: TargetFormat, samples: &[f32]) -> Result<Self> {
        let channels = format.channels as usize;
        if channels == 0 {
            return Err(LoopError::InvalidConfig("target format has no channels".into()));
        }
        let frames = samples.len() / channels;
        let mut audio = Self::allocate(format, frames)?;

        if format.interleaved {
            audio.buffers[0].copy_from_slice(&samples[..frames * channels]);
        } else {
            for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
                for (ch, &sample) in chunk.iter().enumerate() {
                    audio.buffers[ch][frame] = sample;
                }
            }
        }

        audio.frame_count = frames;
        Ok(audio)
    }

    /// Playback format of the samples
    pub fn format(&self) -> &TargetFormat {
        &self.format
    }

    /// Number of frames actually decoded
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of frames the buffers were sized for
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Check if there is nothing to play
    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    /// Sample buffers, one per channel group
    pub fn buffers(&self) -> &[Box<[f32]>] {
        &self.buffers
    }

    /// Samples of the first buffer covering the decoded frames only
    pub fn samples(&self) -> &[f32] {
        &self.buffers[0][..self.frame_count * self.format.channels_per_buffer()]
    }

    /// Size in bytes of the decoded frames
    pub fn byte_len(&self) -> usize {
        self.format.frames_to_bytes(self.frame_count)
    }

    /// Playing time of one loop iteration
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(
            self.frame_count as f64 / self.format.sample_rate as f64,
        )
    }

    /// Mutable views of every buffer starting at `frame_offset`
    ///
    /// Used by the loader to hand the source direct offset slices for each
    /// chunk read.
    pub(crate) fn slices_from(&mut self, frame_offset: usize, frames: usize) -> Vec<&mut [f32]> {
        let per_frame = self.format.channels_per_buffer();
        let start = frame_offset * per_frame;
        let end = start + frames * per_frame;
        self.buffers
            .iter_mut()
            .map(|buffer| &mut buffer[start..end])
            .collect()
    }

    /// Record how many frames were actually decoded
    pub(crate) fn set_frame_count(&mut self, frames: usize) {
        self.frame_count = frames.min(self.capacity_frames);
    }
}

/// Allocate a zeroed sample buffer, reporting exhaustion as an error
fn zeroed_samples(len: usize, bytes: usize) -> Result<Box<[f32]>> {
    let mut samples: Vec<f32> = Vec::new();
    samples
        .try_reserve_exact(len)
        .map_err(|_| LoopError::Allocation { bytes })?;
    samples.resize(len, 0.0);
    Ok(samples.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TARGET_FORMAT;

    #[test]
    fn test_allocate_zeroed() {
        let audio = DecodedAudio::allocate(TARGET_FORMAT, 16).unwrap();
        assert_eq!(audio.buffers().len(), 1);
        assert_eq!(audio.buffers()[0].len(), 32);
        assert!(audio.buffers()[0].iter().all(|&s| s == 0.0));
        assert_eq!(audio.frame_count(), 0);
        assert!(audio.is_empty());
    }

    #[test]
    fn test_allocate_planar() {
        let planar = TargetFormat {
            interleaved: false,
            ..TARGET_FORMAT
        };
        let audio = DecodedAudio::allocate(planar, 10).unwrap();
        assert_eq!(audio.buffers().len(), 2);
        assert!(audio.buffers().iter().all(|b| b.len() == 10));
    }

    #[test]
    fn test_allocation_overflow_is_error() {
        let err = DecodedAudio::allocate(TARGET_FORMAT, usize::MAX).unwrap_err();
        assert!(matches!(err, LoopError::Allocation { .. }));
    }

    #[test]
    fn test_from_interleaved() {
        let audio =
            DecodedAudio::from_interleaved(TARGET_FORMAT, &[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        assert_eq!(audio.frame_count(), 2);
        assert_eq!(audio.samples(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(audio.byte_len(), 16);
    }

    #[test]
    fn test_frame_count_clamped_to_capacity() {
        let mut audio = DecodedAudio::allocate(TARGET_FORMAT, 4).unwrap();
        audio.set_frame_count(10);
        assert_eq!(audio.frame_count(), 4);
    }

    #[test]
    fn test_slices_from_offset() {
        let mut audio = DecodedAudio::allocate(TARGET_FORMAT, 8).unwrap();
        {
            let mut slices = audio.slices_from(6, 2);
            assert_eq!(slices.len(), 1);
            assert_eq!(slices[0].len(), 4);
            slices[0].fill(1.0);
        }
        audio.set_frame_count(8);
        assert_eq!(&audio.samples()[12..], &[1.0, 1.0, 1.0, 1.0]);
        assert!(audio.samples()[..12].iter().all(|&s| s == 0.0));
    }
}
