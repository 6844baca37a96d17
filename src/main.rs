//! loopplay - gapless in-memory audio looper CLI

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use loopplay::audio::{
    AudioSource, EngineEvent, FileSource, Loader, PlaybackEngine, TARGET_FORMAT,
};
use loopplay::config::{Args, Command, PlayerConfig};
use loopplay::device::DeviceEnumerator;

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    // Initialize logging
    init_logging(&args, &config)?;

    // Execute command
    match args.command {
        Command::Play {
            file,
            device,
            frames_per_slice,
            chunk_frames,
        } => {
            let config = config.with_overrides(device, frames_per_slice, chunk_frames);
            config.validate()?;
            cmd_play(&file, &config)
        }
        Command::Devices { names_only } => cmd_devices(names_only),
        Command::Info { file } => cmd_info(&file),
        Command::Config { init, path } => cmd_config(init, path, &config),
    }
}

/// Load the config file without validating it; values are checked once
/// command line overrides are applied
fn load_config(args: &Args) -> Result<PlayerConfig> {
    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::load_default()?,
    };
    Ok(config)
}

fn init_logging(args: &Args, config: &PlayerConfig) -> Result<()> {
    let level = args.log_level(config.level());

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = args
        .log
        .clone()
        .or_else(|| (!config.log_file.is_empty()).then(|| config.log_file.clone()));

    if let Some(log_file) = log_file {
        let file = std::fs::File::create(&log_file)
            .with_context(|| format!("Could not create log file {}", log_file))?;
        subscriber.with_writer(std::sync::Mutex::new(file)).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Load a file and loop it until Ctrl+C
fn cmd_play(file: &Path, config: &PlayerConfig) -> Result<()> {
    println!("loopplay - gapless audio looper\n");

    let loader = Loader::new().with_chunk_frames(config.chunk_frames)?;
    let audio = loader
        .load(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    println!(
        "Loaded {}: {} frames ({:.2}s, {} bytes) at {}",
        file.display(),
        audio.frame_count(),
        audio.duration().as_secs_f64(),
        audio.byte_len(),
        audio.format()
    );

    let mut engine = PlaybackEngine::new(config.to_engine_config());

    let (event_tx, event_rx) = bounded::<EngineEvent>(16);
    engine.set_event_channel(event_tx);

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }

    // Start the engine
    match engine.start(audio) {
        Ok(()) => {
            if let Some(name) = engine.device_name() {
                println!("Output device: {}", name);
            }
            if let Some(audio) = engine.audio() {
                println!("Loop length: {:.2}s", audio.duration().as_secs_f64());
            }
            println!("\nLooping. Press Ctrl+C to stop.\n");
        }
        Err(e) => {
            error!("Failed to start engine: {}", e);
            return Err(e.into());
        }
    }

    // Wait for Ctrl+C or a stream failure
    while running.load(Ordering::SeqCst) && engine.is_running() {
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(EngineEvent::StreamError(message)) => {
                warn!("Output stream reported: {}", message);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stop the engine
    engine.stop()?;
    println!("Stopped.");

    Ok(())
}

/// List available output devices
fn cmd_devices(names_only: bool) -> Result<()> {
    let enumerator = DeviceEnumerator::new();
    let devices = enumerator.enumerate_all_devices()?;

    if names_only {
        for device in &devices {
            println!("{}", device.name);
        }
        return Ok(());
    }

    if devices.is_empty() {
        println!("No output devices found on host {}.", enumerator.host_name());
        return Ok(());
    }

    println!("Output devices ({}):\n", enumerator.host_name());

    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {}", i + 1, device);
    }

    println!();
    Ok(())
}

/// Show native format and converted length of a file
fn cmd_info(file: &PathBuf) -> Result<()> {
    let source = FileSource::open(file)?;
    let native = source.native_format();

    println!("File Information:\n");
    println!("  Path:      {}", file.display());
    println!("  Format:    {}", native);

    match source.native_frames() {
        Ok(frames) => {
            let converted = TARGET_FORMAT.output_frames_for(frames, native.sample_rate);
            println!(
                "  Frames:    {} ({:.2}s)",
                frames,
                frames as f64 / native.sample_rate as f64
            );
            println!("  Converted: {} frames at {}", converted, TARGET_FORMAT);
            println!(
                "  Memory:    {} bytes",
                TARGET_FORMAT.frames_to_bytes(converted as usize)
            );
        }
        Err(e) => println!("  Frames:    unknown ({})", e),
    }

    Ok(())
}

/// Print the sample configuration, or save the current one
fn cmd_config(init: bool, path: Option<PathBuf>, config: &PlayerConfig) -> Result<()> {
    if !init {
        print!("{}", PlayerConfig::sample_config());
        return Ok(());
    }

    let path = path
        .or_else(PlayerConfig::default_path)
        .context("No configuration directory available, pass a path")?;
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    config.validate()?;
    config.save(&path)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
