//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// loopplay - gapless in-memory audio looper
///
/// Decodes an audio file into memory and plays it in a loop until stopped
#[derive(Parser, Debug)]
#[command(name = "loopplay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Configuration file (default: <config dir>/loopplay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a file and loop it until Ctrl+C
    Play {
        /// Audio file to play
        file: PathBuf,

        /// Output device name (exact or partial match)
        #[arg(short, long)]
        device: Option<String>,

        /// Maximum frames the device may request per callback
        #[arg(long)]
        frames_per_slice: Option<u32>,

        /// Frames decoded per read while loading (max 16384)
        #[arg(long)]
        chunk_frames: Option<usize>,
    },

    /// List all available output devices
    Devices {
        /// Print names only (useful for scripting)
        #[arg(long)]
        names_only: bool,
    },

    /// Show the native format of a file and its converted length
    Info {
        /// Audio file to inspect
        file: PathBuf,
    },

    /// Print a sample configuration, or write the current one with --init
    Config {
        /// Write the current configuration to a file
        #[arg(long)]
        init: bool,

        /// Destination for --init (default: <config dir>/loopplay/config.toml)
        #[arg(requires = "init")]
        path: Option<PathBuf>,
    },
}

impl Args {
    /// Get the log level based on verbose/quiet flags
    ///
    /// Without either flag, `fallback` (from the config file) applies.
    pub fn log_level(&self, fallback: tracing::Level) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => fallback,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }
}
