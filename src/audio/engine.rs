//! Playback engine - owns the output stream and the looping audio

use crate::audio::{DecodedAudio, LoopRenderer, TargetFormat};
use crate::device::DeviceEnumerator;
use crate::error::{LoopError, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default maximum frames the device may request per callback
pub const DEFAULT_FRAMES_PER_SLICE: u32 = 4096;

/// Largest callback size accepted from configuration
pub const MAX_FRAMES_PER_SLICE: u32 = 16_384;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output device name (None = host default)
    pub device_name: Option<String>,
    /// Maximum frames per callback (None = device default)
    pub frames_per_slice: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            frames_per_slice: Some(DEFAULT_FRAMES_PER_SLICE),
        }
    }
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Never started
    Uninitialized,
    /// Not running
    Stopped,
    /// Output stream playing
    Running,
    /// Output stream reported an error and may have stopped producing audio
    Faulted,
    /// Shutting down
    ShuttingDown,
}

/// Events from the engine that external controllers might care about
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The host reported a stream error
    StreamError(String),
}

/// Plays decoded audio in a loop on an output device
pub struct PlaybackEngine {
    config: EngineConfig,
    state: Arc<Mutex<EngineState>>,
    stream: Option<Stream>,
    audio: Option<Arc<DecodedAudio>>,
    device_name: Option<String>,
    event_tx: Option<Sender<EngineEvent>>,
}

impl PlaybackEngine {
    /// Create a new playback engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(EngineState::Uninitialized)),
            stream: None,
            audio: None,
            device_name: None,
            event_tx: None,
        }
    }

    /// Set an event notification channel
    ///
    /// Must be set before `start` to receive events from that stream.
    pub fn set_event_channel(&mut self, tx: Sender<EngineEvent>) {
        self.event_tx = Some(tx);
    }

    /// Get current engine state
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Check if engine is running
    pub fn is_running(&self) -> bool {
        *self.state.lock() == EngineState::Running
    }

    /// Name of the device playing (available while running)
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Audio being looped (available while running)
    pub fn audio(&self) -> Option<&DecodedAudio> {
        self.audio.as_deref()
    }

    /// Start looping `audio` on the output device
    ///
    /// Either the stream is playing when this returns `Ok`, or everything
    /// acquired along the way has been released.
    pub fn start(&mut self, audio: DecodedAudio) -> Result<()> {
        {
            let state = self.state.lock();
            if matches!(*state, EngineState::Running | EngineState::Faulted) {
                return Err(LoopError::AlreadyRunning);
            }
        }

        if audio.is_empty() {
            return Err(LoopError::EmptyAudio);
        }

        info!("Starting playback engine...");

        let format = *audio.format();
        let frame_count = audio.frame_count();
        let audio = Arc::new(audio);
        let mut renderer = LoopRenderer::new(audio.clone())?;

        let enumerator = DeviceEnumerator::new();
        let device = match &self.config.device_name {
            Some(name) => enumerator.get_device_by_name(name)?,
            None => enumerator.get_default_output_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using output device: {}", device_name);

        let stream_config = self.stream_config(&device, &device_name, &format)?;
        debug!(
            "Stream config: sample_rate={}, channels={}, buffer_size={:?}",
            stream_config.sample_rate.0, stream_config.channels, stream_config.buffer_size
        );

        let error_state = self.state.clone();
        let error_tx = self.event_tx.clone();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    {
                        let mut state = error_state.lock();
                        if *state == EngineState::Running {
                            *state = EngineState::Faulted;
                        }
                    }
                    if let Some(tx) = &error_tx {
                        let _ = tx.try_send(EngineEvent::StreamError(err.to_string()));
                    }
                },
                None,
            )
            .map_err(|e| LoopError::device("Could not build output stream", e))?;

        stream
            .play()
            .map_err(|e| LoopError::device("Could not start output stream", e))?;

        self.stream = Some(stream);
        self.audio = Some(audio);
        self.device_name = Some(device_name);
        *self.state.lock() = EngineState::Running;

        info!("Playback engine started ({} frames per loop)", frame_count);
        Ok(())
    }

    /// Stop the engine
    ///
    /// Returns once the host guarantees no further callbacks, then releases
    /// the decoded audio. Stopping an engine that is not running is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, EngineState::Running | EngineState::Faulted) {
                return Ok(());
            }
            *state = EngineState::ShuttingDown;
        }

        info!("Stopping playback engine...");

        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause output stream: {}", e);
            }
            // Dropping the stream joins the host's callback thread
            drop(stream);
        }

        self.audio = None;
        self.device_name = None;

        *self.state.lock() = EngineState::Stopped;
        info!("Playback engine stopped");

        Ok(())
    }

    /// Find a device configuration matching `format` exactly
    fn stream_config(
        &self,
        device: &cpal::Device,
        device_name: &str,
        format: &TargetFormat,
    ) -> Result<StreamConfig> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| LoopError::device("Could not query output configurations", e))?
            .find(|config| {
                config.channels() == format.channels
                    && config.sample_format() == SampleFormat::F32
                    && config.min_sample_rate().0 <= format.sample_rate
                    && config.max_sample_rate().0 >= format.sample_rate
            })
            .ok_or_else(|| {
                LoopError::device(
                    "Stream format not supported",
                    format!("{} unavailable on {}", format, device_name),
                )
            })?;

        Ok(StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: select_buffer_size(self.config.frames_per_slice, supported.buffer_size()),
        })
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Pick a fixed callback size when the device allows it
fn select_buffer_size(requested: Option<u32>, supported: &SupportedBufferSize) -> BufferSize {
    match (requested, supported) {
        (Some(frames), SupportedBufferSize::Range { min, max }) if (*min..=*max).contains(&frames) => {
            BufferSize::Fixed(frames)
        }
        (Some(frames), _) => {
            debug!(
                "Frames per slice {} not supported by device ({:?}), using device default",
                frames, supported
            );
            BufferSize::Default
        }
        (None, _) => BufferSize::Default,
    }
}
