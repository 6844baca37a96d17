//! Audio file sources that deliver frames converted to the client format

use crate::audio::{SourceFormat, StreamConverter, TargetFormat};
use crate::error::{LoopError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, trace, warn};

/// An opened audio source that converts on read
///
/// Mirrors the lifecycle the loader drives: query the native format, set the
/// client format once, then read converted frames until a read returns 0.
pub trait AudioSource {
    /// Native format reported by the source
    fn native_format(&self) -> &SourceFormat;

    /// Configure every subsequent read to deliver `format`
    fn set_client_format(&mut self, format: &TargetFormat) -> Result<()>;

    /// Nominal length in frames at the native sample rate
    fn native_frames(&self) -> Result<u64>;

    /// Read up to `frames` converted frames into `buffers`
    ///
    /// `buffers` holds one slice per channel group of the client format, each
    /// with room for at least `frames` frames. Returns the number of frames
    /// written; 0 means the stream has ended.
    fn read(&mut self, buffers: &mut [&mut [f32]], frames: usize) -> Result<usize>;
}

/// Audio file decoded with symphonia
pub struct FileSource {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: CodecParameters,
    format: SourceFormat,
    decoder: Option<Box<dyn Decoder>>,
    converter: Option<StreamConverter>,
    sample_buf: Option<SampleBuffer<f32>>,
    sample_buf_frames: usize,
    end_of_stream: bool,
}

impl FileSource {
    /// Open and probe an audio file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening audio file: {}", path.display());

        let file = File::open(&path).map_err(|e| LoopError::open("Could not open audio file", e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        // Gapless trimming keeps encoder priming out of the loop seam
        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| LoopError::open("Could not read audio file format", e))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LoopError::open("Could not find an audio track", "no decodable track"))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.ok_or_else(|| {
            LoopError::format("Could not get file data format", "sample rate unknown")
        })?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| {
                LoopError::format("Could not get file data format", "channel count unknown")
            })?;

        let codec = symphonia::default::get_codecs()
            .get_codec(codec_params.codec)
            .map(|d| d.short_name.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let format = SourceFormat {
            sample_rate,
            channels,
            codec,
            bits_per_sample: codec_params.bits_per_sample,
        };

        info!("Opened {}: {}", path.display(), format);

        Ok(Self {
            path,
            reader,
            track_id,
            codec_params,
            format,
            decoder: None,
            converter: None,
            sample_buf: None,
            sample_buf_frames: 0,
            end_of_stream: false,
        })
    }

    /// Decode the next packet of the selected track into the converter
    fn decode_next_packet(&mut self) -> Result<()> {
        let packet = match self.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Reached end of file");
                return self.finish();
            }
            Err(SymphoniaError::ResetRequired) => {
                debug!("Stream reset required, treating as end of stream");
                return self.finish();
            }
            Err(e) => return Err(LoopError::read("Could not read audio packet", e)),
        };

        if packet.track_id() != self.track_id {
            return Ok(());
        }

        let (Some(decoder), Some(converter)) = (self.decoder.as_mut(), self.converter.as_mut())
        else {
            return Err(not_configured());
        };

        let ended = match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if decoded.frames() > 0 {
                    if spec.channels.count() != self.format.channels as usize {
                        return Err(LoopError::read(
                            "Could not decode audio packet",
                            format!(
                                "channel count changed from {} to {}",
                                self.format.channels,
                                spec.channels.count()
                            ),
                        ));
                    }

                    if self.sample_buf.is_none() || self.sample_buf_frames < decoded.capacity() {
                        self.sample_buf_frames = decoded.capacity();
                        self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }

                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        trace!("Decoded {} frames", buf.samples().len() / spec.channels.count());
                        converter.push_interleaved(buf.samples())?;
                    }
                }
                false
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet in {}: {}", self.path.display(), e);
                false
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => true,
            Err(e) => return Err(LoopError::read("Could not decode audio packet", e)),
        };

        if ended {
            self.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.end_of_stream = true;
        match self.converter.as_mut() {
            Some(converter) => converter.finish(),
            None => Err(not_configured()),
        }
    }

    fn converted_available(&self) -> usize {
        self.converter.as_ref().map_or(0, StreamConverter::available)
    }
}

impl AudioSource for FileSource {
    fn native_format(&self) -> &SourceFormat {
        &self.format
    }

    fn set_client_format(&mut self, format: &TargetFormat) -> Result<()> {
        let decoder = symphonia::default::get_codecs()
            .make(&self.codec_params, &DecoderOptions::default())
            .map_err(|e| LoopError::format("Could not apply audio format", e))?;
        let converter =
            StreamConverter::new(self.format.sample_rate, self.format.channels, *format)?;

        debug!("Client format set: {} -> {}", self.format, format);
        self.decoder = Some(decoder);
        self.converter = Some(converter);
        Ok(())
    }

    fn native_frames(&self) -> Result<u64> {
        self.codec_params.n_frames.ok_or_else(|| {
            LoopError::format(
                "Could not get file length in frames",
                "container does not report a length",
            )
        })
    }

    fn read(&mut self, buffers: &mut [&mut [f32]], frames: usize) -> Result<usize> {
        if self.converter.is_none() {
            return Err(not_configured());
        }

        while !self.end_of_stream && self.converted_available() < frames {
            self.decode_next_packet()?;
        }

        match self.converter.as_mut() {
            Some(converter) => Ok(converter.pop_into(buffers, frames)),
            None => Err(not_configured()),
        }
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        debug!("Closed audio file: {}", self.path.display());
    }
}

fn not_configured() -> LoopError {
    LoopError::format("Could not read audio file", "client format not set")
}
