//! Command line and configuration file handling

mod args;
mod file;

pub use args::{Args, Command};
pub use file::{ConfigError, PlayerConfig};
