//! loopplay - gapless in-memory audio looper
//!
//! Decodes an audio file into memory, converted to a fixed playback format,
//! and loops it through a real-time output callback.

pub mod audio;
pub mod config;
pub mod device;
pub mod error;

pub use error::{LoopError, LoopErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
