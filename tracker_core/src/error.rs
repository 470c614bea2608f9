/*!
Common error types for the tracker components.
*/

use thiserror::Error;

/// Common result type used throughout the core library
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Reasons a completed 29-byte frame is rejected.
///
/// These never leave the synchronizer as failures; they are counted and
/// reported as diagnostics while the stream resynchronizes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Device id mismatch: expected {expected}, got {found}")]
    DeviceMismatch { expected: u8, found: u8 },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{found:02X}")]
    Checksum { expected: u8, found: u8 },

    #[error("Invalid frame length: expected 29 bytes, got {0}")]
    InvalidLength(usize),
}

/// Comprehensive error type for all core operations
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Framing errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O errors from a byte source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport could not be opened or failed mid-stream
    #[error("Transport error: {0}")]
    Transport(String),
}

impl TrackerError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
