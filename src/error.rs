//! Unified error types for loopplay

use thiserror::Error;

/// Main error type for loopplay operations
///
/// Every variant that wraps a failing host or decoder call carries the
/// operation that failed and the underlying status, rendered as
/// `"{operation} ({status})"`.
#[derive(Error, Debug)]
pub enum LoopError {
    /// Source could not be opened, probed, or has no decodable track
    #[error("{operation} ({status})")]
    Open { operation: String, status: String },

    /// Source format unsupported or conversion could not be configured
    #[error("{operation} ({status})")]
    Format { operation: String, status: String },

    /// Destination buffer allocation failed
    #[error("Could not allocate {bytes} bytes for decoded audio")]
    Allocation { bytes: usize },

    /// Output device acquisition or configuration failed
    #[error("{operation} ({status})")]
    Device { operation: String, status: String },

    /// Decode read failed mid-stream
    #[error("{operation} ({status})")]
    Read { operation: String, status: String },

    /// Playback refused because there is nothing to loop
    #[error("Decoded audio is empty, refusing to start playback")]
    EmptyAudio,

    /// Named output device not found
    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    /// Engine already running
    #[error("Playback engine already running")]
    AlreadyRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Discriminant of [`LoopError`] without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopErrorKind {
    Open,
    Format,
    Allocation,
    Device,
    Read,
    EmptyAudio,
    DeviceNotFound,
    AlreadyRunning,
    InvalidConfig,
}

/// Result type alias for loopplay operations
pub type Result<T> = std::result::Result<T, LoopError>;

impl LoopError {
    /// Create an open error with context
    pub fn open(operation: impl Into<String>, status: impl ToString) -> Self {
        Self::Open {
            operation: operation.into(),
            status: status.to_string(),
        }
    }

    /// Create a format error with context
    pub fn format(operation: impl Into<String>, status: impl ToString) -> Self {
        Self::Format {
            operation: operation.into(),
            status: status.to_string(),
        }
    }

    /// Create a device error with context
    pub fn device(operation: impl Into<String>, status: impl ToString) -> Self {
        Self::Device {
            operation: operation.into(),
            status: status.to_string(),
        }
    }

    /// Create a read error with context
    pub fn read(operation: impl Into<String>, status: impl ToString) -> Self {
        Self::Read {
            operation: operation.into(),
            status: status.to_string(),
        }
    }

    pub fn kind(&self) -> LoopErrorKind {
        match self {
            LoopError::Open { .. } => LoopErrorKind::Open,
            LoopError::Format { .. } => LoopErrorKind::Format,
            LoopError::Allocation { .. } => LoopErrorKind::Allocation,
            LoopError::Device { .. } => LoopErrorKind::Device,
            LoopError::Read { .. } => LoopErrorKind::Read,
            LoopError::EmptyAudio => LoopErrorKind::EmptyAudio,
            LoopError::DeviceNotFound(_) => LoopErrorKind::DeviceNotFound,
            LoopError::AlreadyRunning => LoopErrorKind::AlreadyRunning,
            LoopError::InvalidConfig(_) => LoopErrorKind::InvalidConfig,
        }
    }

    /// Name of the step that failed, when the error carries one
    pub fn operation(&self) -> Option<&str> {
        match self {
            LoopError::Open { operation, .. }
            | LoopError::Format { operation, .. }
            | LoopError::Device { operation, .. }
            | LoopError::Read { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
