/*!
Tracker configuration.
*/

use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Result, TrackerError};
use crate::lens::CalibrationMode;
use crate::pose::PoseOffsets;
use crate::protocol::DEFAULT_DEVICE_ID;

/// Settings for one tracker decode path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Device identity byte accepted in frames
    pub device_id: u8,

    /// Lens calibration strategy
    pub calibration: CalibrationMode,

    /// Upper bound on a single transport read, so stop requests are noticed
    pub read_timeout_ms: u64,

    /// Offsets added to the decoded pose
    pub offsets: PoseOffsets,
}

impl TrackerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject settings the decode loop cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(TrackerError::config("read_timeout_ms must be greater than zero"));
        }
        let offsets = [self.offsets.translate, self.offsets.rotate];
        if offsets.iter().any(|a| !(a.x.is_finite() && a.y.is_finite() && a.z.is_finite())) {
            return Err(TrackerError::config("offsets must be finite"));
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            calibration: CalibrationMode::AutoRange,
            read_timeout_ms: 100,
            offsets: PoseOffsets::default(),
        }
    }
}
