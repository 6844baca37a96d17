//! End-to-end loading of real WAV files written with hound

use loopplay::audio::{
    AudioSource, EngineConfig, FileSource, Loader, PlaybackEngine, TARGET_FORMAT,
};
use loopplay::{LoopError, LoopErrorKind};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, samples: &[i16]) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn sine(sample_rate: u32, frequency: f32, frames: usize, amplitude: f32) -> Vec<i16> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            ((2.0 * PI * frequency * t).sin() * amplitude * i16::MAX as f32) as i16
        })
        .collect()
}

fn sign_changes(samples: impl Iterator<Item = f32>) -> usize {
    let mut count = 0;
    let mut previous: Option<bool> = None;
    for sample in samples {
        if sample.abs() < 1e-3 {
            continue;
        }
        let positive = sample > 0.0;
        if previous.is_some_and(|p| p != positive) {
            count += 1;
        }
        previous = Some(positive);
    }
    count
}

#[test]
fn test_mono_22k_loads_as_stereo_44k() {
    let dir = tempfile::tempdir().unwrap();
    let original = sine(22_050, 441.0, 44_100, 0.5);
    let path = write_wav(dir.path(), "tone.wav", 22_050, 1, &original);

    let audio = Loader::new().load(&path).unwrap();

    assert_eq!(*audio.format(), TARGET_FORMAT);
    assert_eq!(audio.capacity_frames(), 88_200);
    assert!(
        (88_198..=88_200).contains(&audio.frame_count()),
        "frame_count = {}",
        audio.frame_count()
    );

    let frames: Vec<&[f32]> = audio.samples().chunks_exact(2).collect();
    for frame in &frames {
        assert_eq!(frame[0], frame[1]);
    }

    let expected = sign_changes(original.iter().map(|&s| s as f32 / 32768.0));
    let actual = sign_changes(frames.iter().map(|f| f[0]));
    assert!(
        expected.abs_diff(actual) <= 4,
        "expected about {} sign changes, got {}",
        expected,
        actual
    );
}

#[test]
fn test_stereo_44k_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let left = sine(44_100, 300.0, 10_000, 0.8);
    let right = sine(44_100, 700.0, 10_000, 0.3);
    let interleaved: Vec<i16> = left
        .iter()
        .zip(&right)
        .flat_map(|(&l, &r)| [l, r])
        .collect();
    let path = write_wav(dir.path(), "stereo.wav", 44_100, 2, &interleaved);

    let audio = Loader::new().with_chunk_frames(4_000).unwrap().load(&path).unwrap();

    assert_eq!(audio.frame_count(), 10_000);
    for (decoded, &source) in audio.samples().iter().zip(&interleaved) {
        let expected = source as f32 / 32768.0;
        assert!((decoded - expected).abs() < 1e-4);
    }
}

#[test]
fn test_48k_estimate() {
    let dir = tempfile::tempdir().unwrap();
    let frames = 12_345u64;
    let path = write_wav(
        dir.path(),
        "48k.wav",
        48_000,
        1,
        &sine(48_000, 1000.0, frames as usize, 0.5),
    );

    let source = FileSource::open(&path).unwrap();
    assert_eq!(source.native_format().sample_rate, 48_000);
    assert_eq!(source.native_format().channels, 1);
    assert_eq!(source.native_frames().unwrap(), frames);

    let estimate = TARGET_FORMAT.output_frames_for(frames, 48_000);
    assert_eq!(estimate, (frames * 44_100).div_ceil(48_000));

    let audio = Loader::new().load_source(source).unwrap();
    assert_eq!(audio.capacity_frames() as u64, estimate);
    assert!(audio.frame_count() as u64 <= estimate);
    assert!(audio.frame_count() as u64 >= estimate - 2);
}

#[test]
fn test_missing_file_is_open_error() {
    let err = Loader::new().load("/nonexistent/loopplay/tone.wav").unwrap_err();
    assert_eq!(err.kind(), LoopErrorKind::Open);
    assert!(err.to_string().starts_with("Could not open audio file ("));
}

#[test]
fn test_text_file_is_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "this is not audio, just some words\n".repeat(64)).unwrap();

    let err = Loader::new().load(&path).unwrap_err();
    assert_eq!(err.kind(), LoopErrorKind::Open);
}

#[test]
fn test_empty_file_refused_by_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "empty.wav", 44_100, 2, &[]);

    let audio = Loader::new().load(&path).unwrap();
    assert!(audio.is_empty());

    let mut engine = PlaybackEngine::new(EngineConfig::default());
    let err = engine.start(audio).unwrap_err();
    assert!(matches!(err, LoopError::EmptyAudio));
    assert!(!engine.is_running());
}
