/*!
# Tracker Core

Protocol and calibration logic for pan-tilt-zoom-focus camera-tracking
encoders that stream fixed 29-byte frames over a serial line.

## Core Types

- [`Frame`] - One validated 29-byte protocol frame
- [`FrameSynchronizer`] - Streaming byte-to-frame resynchronizer
- [`LensCalibrator`] - Auto-ranging zoom/focus normalizer
- [`ThroughputMeter`] - Per-second frame rate with rolling average
- [`TelemetryState`] - Thread-shared latest [`TelemetrySample`]
- [`Decoder`] - Wires the above together behind `feed(bytes)`
- [`DecodeLoop`] - Runs a [`Decoder`] against a [`ByteSource`] on its own thread

## Modules

- [`field`] - 24-bit field decoding
- [`frame`] - Frame layout, checksum and validation
- [`sync`] - Frame synchronization state machine
- [`pose`] - Pose assembly from frame fields and offsets
- [`lens`] - Zoom/focus calibration
- [`throughput`] - Frame rate measurement
- [`telemetry`] - Output channels and shared state
- [`decoder`] - Decode path and command handling
- [`session`] - Background decode loop and byte sources
- [`config`] - Tracker configuration
- [`error`] - Common error types
*/

pub mod config;
pub mod decoder;
pub mod error;
pub mod field;
pub mod frame;
pub mod lens;
pub mod pose;
pub mod session;
pub mod sync;
pub mod telemetry;
pub mod throughput;

// Re-export commonly used types
pub use config::TrackerConfig;
pub use decoder::{Command, Decoder};
pub use error::{FrameError, Result, TrackerError};
pub use field::decode24;
pub use frame::Frame;
pub use lens::{CalibrationMode, CalibrationRange, LensCalibrator};
pub use pose::{Axes, Pose, PoseOffsets};
pub use session::{ByteSource, DecodeLoop, ReplaySource};
pub use sync::{FrameSynchronizer, SyncState, SyncStats};
pub use telemetry::{LinkStatus, TelemetrySample, TelemetryState};
pub use throughput::{Clock, SystemClock, ThroughputMeter};

/// Version information for the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Size of a frame in bytes
    pub const FRAME_LEN: usize = 29;

    /// Leading byte of every frame
    pub const SYNC_MARKER: u8 = 0xD1;

    /// Device identity most encoders ship with
    pub const DEFAULT_DEVICE_ID: u8 = 1;

    /// Checksum seed: a frame is valid when `(SEED - sum(bytes[0..28])) mod 256` equals byte 28
    pub const CHECKSUM_SEED: u8 = 0x40;

    /// Rotation fields are fixed-point with 15 fractional bits
    pub const ROTATION_SCALE: f64 = 32768.0;

    /// Translation fields count 1/64 mm
    pub const TRANSLATION_SCALE: f64 = 64.0;

    /// Millimetres to metres
    pub const MILLIMETRES_TO_METRES: f64 = 0.001;

    /// Bias subtracted from raw lens readings (0x80000)
    pub const LENS_BIAS: i64 = 0x80000;

    /// Number of per-second counts averaged into `fps_avg`
    pub const THROUGHPUT_HISTORY_LEN: usize = 11;
}
