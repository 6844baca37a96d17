//! Bulk loader: decodes a whole source into memory in bounded chunks

use crate::audio::{AudioSource, DecodedAudio, FileSource, TargetFormat, TARGET_FORMAT};
use crate::error::{LoopError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Largest number of frames requested from a source in one read
///
/// Large single reads through a sample rate converter are unreliable, so the
/// loader never asks for more than this.
pub const MAX_CHUNK_FRAMES: usize = 16_384;

/// Decodes audio sources into [`DecodedAudio`]
#[derive(Debug, Clone)]
pub struct Loader {
    format: TargetFormat,
    chunk_frames: usize,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Loader producing [`TARGET_FORMAT`] with the maximum chunk size
    pub fn new() -> Self {
        Self {
            format: TARGET_FORMAT,
            chunk_frames: MAX_CHUNK_FRAMES,
        }
    }

    /// Use a smaller read chunk (1..=[`MAX_CHUNK_FRAMES`])
    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Result<Self> {
        if chunk_frames == 0 || chunk_frames > MAX_CHUNK_FRAMES {
            return Err(LoopError::InvalidConfig(format!(
                "chunk_frames must be between 1 and {}, got {}",
                MAX_CHUNK_FRAMES, chunk_frames
            )));
        }
        self.chunk_frames = chunk_frames;
        Ok(self)
    }

    /// Open the file at `path` and decode it entirely
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<DecodedAudio> {
        let source = FileSource::open(path)?;
        self.load_source(source)
    }

    /// Decode an already opened source entirely
    ///
    /// The returned audio is sized from the source's nominal length scaled to
    /// the output rate, but `frame_count` is what the source actually
    /// delivered. The source is dropped before returning on every path.
    pub fn load_source<S: AudioSource>(&self, mut source: S) -> Result<DecodedAudio> {
        let native = source.native_format().clone();

        source.set_client_format(&self.format)?;

        let native_frames = source.native_frames()?;
        let estimate = self.format.output_frames_for(native_frames, native.sample_rate);
        let estimate = usize::try_from(estimate).map_err(|_| LoopError::Allocation {
            bytes: usize::MAX,
        })?;

        debug!(
            "Source {} has {} frames, expecting {} frames at {}Hz",
            native, native_frames, estimate, self.format.sample_rate
        );

        let mut audio = DecodedAudio::allocate(self.format, estimate)?;

        let mut frames_read = 0usize;
        while frames_read < estimate {
            let to_read = (estimate - frames_read).min(self.chunk_frames);
            let mut slices = audio.slices_from(frames_read, to_read);

            let read = source.read(&mut slices, to_read)?.min(to_read);
            if read == 0 {
                debug!(
                    "Source ended early after {} of {} frames",
                    frames_read, estimate
                );
                break;
            }

            frames_read += read;
            debug!("Read chunk of {} frames ({}/{})", read, frames_read, estimate);
        }

        drop(source);
        audio.set_frame_count(frames_read);

        info!(
            "Loaded {} frames ({:.2}s) from {} source, estimate was {}",
            frames_read,
            audio.duration().as_secs_f64(),
            native,
            estimate
        );

        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SourceFormat;
    use crate::error::LoopErrorKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        requests: Vec<usize>,
        dropped: bool,
    }

    /// Source delivering a stereo ramp already at the client rate
    struct ScriptedSource {
        format: SourceFormat,
        native_frames: u64,
        deliver: usize,
        delivered: usize,
        fail_format: bool,
        fail_after: Option<usize>,
        max_per_read: usize,
        calls: Rc<RefCell<Calls>>,
    }

    impl ScriptedSource {
        fn new(native_rate: u32, native_frames: u64, deliver: usize) -> Self {
            Self {
                format: SourceFormat {
                    sample_rate: native_rate,
                    channels: 2,
                    codec: "test".to_string(),
                    bits_per_sample: None,
                },
                native_frames,
                deliver,
                delivered: 0,
                fail_format: false,
                fail_after: None,
                max_per_read: usize::MAX,
                calls: Rc::new(RefCell::new(Calls::default())),
            }
        }
    }

    impl AudioSource for ScriptedSource {
        fn native_format(&self) -> &SourceFormat {
            &self.format
        }

        fn set_client_format(&mut self, _format: &TargetFormat) -> Result<()> {
            if self.fail_format {
                return Err(LoopError::format("Could not apply audio format", "unsupported"));
            }
            Ok(())
        }

        fn native_frames(&self) -> Result<u64> {
            Ok(self.native_frames)
        }

        fn read(&mut self, buffers: &mut [&mut [f32]], frames: usize) -> Result<usize> {
            self.calls.borrow_mut().requests.push(frames);
            if let Some(limit) = self.fail_after {
                if self.delivered >= limit {
                    return Err(LoopError::read("Could not read audio packet", "truncated"));
                }
            }

            let n = frames
                .min(self.deliver - self.delivered)
                .min(self.max_per_read);
            for i in 0..n {
                let value = (self.delivered + i) as f32;
                buffers[0][i * 2] = value;
                buffers[0][i * 2 + 1] = -value;
            }
            self.delivered += n;
            Ok(n)
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.calls.borrow_mut().dropped = true;
        }
    }

    #[test]
    fn test_loads_full_estimate() {
        let source = ScriptedSource::new(44_100, 40_000, 40_000);
        let calls = source.calls.clone();

        let audio = Loader::new().load_source(source).unwrap();
        assert_eq!(audio.frame_count(), 40_000);
        assert_eq!(audio.capacity_frames(), 40_000);
        assert_eq!(audio.samples()[2 * 39_999], 39_999.0);
        assert_eq!(audio.samples()[2 * 39_999 + 1], -39_999.0);

        let calls = calls.borrow();
        assert!(calls.dropped);
        assert_eq!(calls.requests, vec![16_384, 16_384, 7_232]);
    }

    #[test]
    fn test_estimate_scaled_to_target_rate() {
        let source = ScriptedSource::new(22_050, 1_000, usize::MAX);
        let audio = Loader::new().load_source(source).unwrap();
        assert_eq!(audio.capacity_frames(), 2_000);
        assert_eq!(audio.frame_count(), 2_000);
    }

    #[test]
    fn test_short_source_uses_actual_count() {
        let source = ScriptedSource::new(44_100, 1_000, 990);
        let calls = source.calls.clone();

        let audio = Loader::new().load_source(source).unwrap();
        assert_eq!(audio.frame_count(), 990);
        assert_eq!(audio.capacity_frames(), 1_000);
        // Unwritten tail stays silent
        assert!(audio.buffers()[0][990 * 2..].iter().all(|&s| s == 0.0));
        assert!(calls.borrow().dropped);
    }

    #[test]
    fn test_short_reads_advance_offset() {
        let mut source = ScriptedSource::new(44_100, 100, 100);
        source.max_per_read = 7;

        let audio = Loader::new().with_chunk_frames(32).unwrap().load_source(source).unwrap();
        assert_eq!(audio.frame_count(), 100);
        for (i, frame) in audio.samples().chunks(2).enumerate() {
            assert_eq!(frame, [i as f32, -(i as f32)]);
        }
    }

    #[test]
    fn test_chunk_size_respected() {
        let source = ScriptedSource::new(44_100, 1_000, 1_000);
        let calls = source.calls.clone();

        Loader::new().with_chunk_frames(300).unwrap().load_source(source).unwrap();
        assert_eq!(calls.borrow().requests, vec![300, 300, 300, 100]);
    }

    #[test]
    fn test_empty_source() {
        let source = ScriptedSource::new(44_100, 0, 0);
        let audio = Loader::new().load_source(source).unwrap();
        assert!(audio.is_empty());
    }

    #[test]
    fn test_format_error_releases_source() {
        let mut source = ScriptedSource::new(44_100, 10, 10);
        source.fail_format = true;
        let calls = source.calls.clone();

        let err = Loader::new().load_source(source).unwrap_err();
        assert_eq!(err.kind(), LoopErrorKind::Format);
        assert!(calls.borrow().dropped);
        assert!(calls.borrow().requests.is_empty());
    }

    #[test]
    fn test_read_error_propagates() {
        let mut source = ScriptedSource::new(44_100, 50_000, 50_000);
        source.fail_after = Some(16_384);
        let calls = source.calls.clone();

        let err = Loader::new().load_source(source).unwrap_err();
        assert_eq!(err.kind(), LoopErrorKind::Read);
        assert!(calls.borrow().dropped);
    }

    #[test]
    fn test_allocation_failure_releases_source() {
        let source = ScriptedSource::new(44_100, u64::MAX, 0);
        let calls = source.calls.clone();

        let err = Loader::new().load_source(source).unwrap_err();
        assert_eq!(err.kind(), LoopErrorKind::Allocation);
        assert!(calls.borrow().dropped);
        assert!(calls.borrow().requests.is_empty());
    }

    #[test]
    fn test_oversized_length_fails_allocation() {
        // Scaled to 44.1kHz this length no longer fits in 64 bits
        let source = ScriptedSource::new(8_000, 3_346_348_131_285_179_450, 0);
        let calls = source.calls.clone();

        let err = Loader::new().load_source(source).unwrap_err();
        assert_eq!(err.kind(), LoopErrorKind::Allocation);
        assert!(calls.borrow().dropped);
        assert!(calls.borrow().requests.is_empty());
    }

    #[test]
    fn test_chunk_frames_validation() {
        assert!(Loader::new().with_chunk_frames(0).is_err());
        assert!(Loader::new().with_chunk_frames(MAX_CHUNK_FRAMES + 1).is_err());
        assert_eq!(Loader::new().with_chunk_frames(1024).unwrap().chunk_frames, 1024);
    }
}
