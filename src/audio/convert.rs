//! Convert-on-read stage: channel mapping and streaming sample rate conversion

use crate::audio::TargetFormat;
use crate::error::{LoopError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;
use tracing::debug;

/// Input frames fed to the resampler per pass
const RESAMPLER_CHUNK_FRAMES: usize = 1024;

/// Upper bound on zero-input passes used to flush the resampler tail
const MAX_FLUSH_PASSES: usize = 16;

/// Converts decoded interleaved samples to a [`TargetFormat`] incrementally
///
/// Source frames are pushed as they are decoded; converted frames are popped
/// in whatever amounts the reader asks for. Mono sources are duplicated to
/// every output channel; wider sources contribute their first channels.
/// When the rates differ, a polynomial resampler runs over fixed input
/// chunks and its output delay is trimmed, so the total output length is
/// `ceil(input_frames * target_rate / source_rate)`.
pub struct StreamConverter {
    target: TargetFormat,
    source_rate: u32,
    source_channels: usize,
    resampler: Option<FastFixedIn<f32>>,
    /// Mapped input waiting for a full resampler chunk, one Vec per channel
    pending: Vec<Vec<f32>>,
    output: ConvertedQueue,
    input_frames: u64,
    finished: bool,
}

impl StreamConverter {
    /// Create a converter from `source_rate`/`source_channels` to `target`
    pub fn new(source_rate: u32, source_channels: u16, target: TargetFormat) -> Result<Self> {
        if source_rate == 0 || source_channels == 0 {
            return Err(LoopError::format(
                "Could not apply audio format",
                format!("invalid source format {}Hz {}ch", source_rate, source_channels),
            ));
        }
        if target.sample_rate == 0 || target.channels == 0 {
            return Err(LoopError::format(
                "Could not apply audio format",
                format!("invalid target format {}", target),
            ));
        }

        let channels = target.channels as usize;
        let resampler = if source_rate == target.sample_rate {
            debug!("Sample rate already at {}Hz, skipping resample", source_rate);
            None
        } else {
            debug!(
                "Resampling from {}Hz to {}Hz ({} channels)",
                source_rate, target.sample_rate, channels
            );
            let resampler = FastFixedIn::<f32>::new(
                target.sample_rate as f64 / source_rate as f64,
                1.0,
                PolynomialDegree::Septic,
                RESAMPLER_CHUNK_FRAMES,
                channels,
            )
            .map_err(|e| LoopError::format("Could not create sample rate converter", e))?;
            Some(resampler)
        };

        let delay = resampler.as_ref().map_or(0, |r| r.output_delay());

        Ok(Self {
            target,
            source_rate,
            source_channels: source_channels as usize,
            resampler,
            pending: vec![Vec::with_capacity(RESAMPLER_CHUNK_FRAMES * 2); channels],
            output: ConvertedQueue::new(channels, delay),
            input_frames: 0,
            finished: false,
        })
    }

    /// Feed interleaved source samples
    ///
    /// A trailing partial frame is ignored.
    pub fn push_interleaved(&mut self, samples: &[f32]) -> Result<()> {
        let source_channels = self.source_channels;
        let frames = samples.len() / source_channels;
        if frames == 0 {
            return Ok(());
        }
        self.input_frames += frames as u64;

        if self.resampler.is_none() {
            self.output.push_mapped(samples, source_channels);
            return Ok(());
        }

        for frame in samples.chunks_exact(source_channels) {
            for (ch, pending) in self.pending.iter_mut().enumerate() {
                pending.push(frame[source_channel_for(ch, source_channels)]);
            }
        }

        self.process_full_chunks()
    }

    /// Signal end of input and flush whatever the resampler still holds
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };

        let expected = self
            .target
            .output_frames_for(self.input_frames, self.source_rate);

        if !self.pending[0].is_empty() {
            let rest: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
            let out = resampler
                .process_partial(Some(rest.as_slice()), None)
                .map_err(|e| LoopError::read("Could not convert sample rate", e))?;
            self.output.push_planar(out);
        }

        let mut passes = 0;
        while self.output.emitted < expected && passes < MAX_FLUSH_PASSES {
            let out = resampler
                .process_partial::<Vec<f32>>(None, None)
                .map_err(|e| LoopError::read("Could not convert sample rate", e))?;
            self.output.push_planar(out);
            passes += 1;
        }

        self.output.truncate_to(expected);
        debug!(
            "Converter flushed: {} input frames -> {} output frames",
            self.input_frames, self.output.emitted
        );
        Ok(())
    }

    /// Converted frames ready to be popped
    pub fn available(&self) -> usize {
        self.output.len()
    }

    /// Move up to `frames` converted frames into `buffers`
    ///
    /// `buffers` follows the target layout: one interleaved buffer, or one
    /// buffer per channel. Returns the number of frames written.
    pub fn pop_into(&mut self, buffers: &mut [&mut [f32]], frames: usize) -> usize {
        self.output.pop_into(buffers, frames, self.target.interleaved)
    }

    fn process_full_chunks(&mut self) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };

        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                return Ok(());
            }

            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|pending| pending.drain(..needed).collect())
                .collect();

            let out = resampler
                .process(&chunk, None)
                .map_err(|e| LoopError::read("Could not convert sample rate", e))?;
            self.output.push_planar(out);
        }
    }
}

/// Source channel feeding output channel `ch`
fn source_channel_for(ch: usize, source_channels: usize) -> usize {
    if source_channels == 1 {
        0
    } else {
        ch.min(source_channels - 1)
    }
}

/// Planar queue of converted frames
struct ConvertedQueue {
    channels: Vec<VecDeque<f32>>,
    /// Leading resampler output still to be discarded
    skip: usize,
    /// Frames accepted into the queue over its lifetime
    emitted: u64,
}

impl ConvertedQueue {
    fn new(channels: usize, skip: usize) -> Self {
        Self {
            channels: vec![VecDeque::new(); channels],
            skip,
            emitted: 0,
        }
    }

    fn len(&self) -> usize {
        self.channels[0].len()
    }

    fn push_planar(&mut self, planar: Vec<Vec<f32>>) {
        let frames = planar.first().map_or(0, Vec::len);
        let skip = self.skip.min(frames);
        self.skip -= skip;

        for (queue, samples) in self.channels.iter_mut().zip(&planar) {
            queue.extend(&samples[skip..]);
        }
        self.emitted += (frames - skip) as u64;
    }

    fn push_mapped(&mut self, interleaved: &[f32], source_channels: usize) {
        for frame in interleaved.chunks_exact(source_channels) {
            for (ch, queue) in self.channels.iter_mut().enumerate() {
                queue.push_back(frame[source_channel_for(ch, source_channels)]);
            }
        }
        self.emitted += (interleaved.len() / source_channels) as u64;
    }

    /// Drop queued frames past `total` emitted frames
    fn truncate_to(&mut self, total: u64) {
        let excess = self.emitted.saturating_sub(total) as usize;
        let excess = excess.min(self.len());
        let keep = self.len() - excess;
        for queue in &mut self.channels {
            queue.truncate(keep);
        }
        self.emitted -= excess as u64;
    }

    fn pop_into(&mut self, buffers: &mut [&mut [f32]], frames: usize, interleaved: bool) -> usize {
        let n = frames.min(self.len());
        let channels = self.channels.len();

        for (ch, queue) in self.channels.iter_mut().enumerate() {
            if interleaved {
                let out = &mut buffers[0];
                for (i, sample) in queue.drain(..n).enumerate() {
                    out[i * channels + ch] = sample;
                }
            } else {
                for (slot, sample) in buffers[ch].iter_mut().zip(queue.drain(..n)) {
                    *slot = sample;
                }
            }
        }

        n
    }
}
