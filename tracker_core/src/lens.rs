/*!
Zoom and focus calibration.

Lens encoders report an uncalibrated ring position. Each channel keeps a
[`CalibrationRange`] and maps the raw reading into `[0, 1]`, with larger raw
readings producing smaller outputs.

Two strategies are supported:

- [`CalibrationMode::AutoRange`]: the range grows to cover every reading seen
  since the last reset. Sweeping the lens end to end once calibrates it.
- [`CalibrationMode::Manual`]: the range is set only by explicit snapshot
  commands capturing the current reading as min or max.
*/

use serde::{Deserialize, Serialize};
use crate::frame::{Field, Frame};
use crate::protocol::LENS_BIAS;

/// How lens ranges are established
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    #[default]
    AutoRange,
    Manual,
}

/// The two calibrated lens channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LensChannel {
    Zoom,
    Focus,
}

impl LensChannel {
    fn field(self) -> Field {
        match self {
            Self::Zoom => Field::Zoom,
            Self::Focus => Field::Focus,
        }
    }
}

/// Unbias a lens field
pub fn lens_raw(frame: &Frame, channel: LensChannel) -> f64 {
    (i64::from(frame.raw(channel.field())) - LENS_BIAS) as f64
}

/// Running min/max of one lens channel. `None` until the first reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationRange {
    bounds: Option<(f64, f64)>,
}

impl CalibrationRange {
    pub fn min(&self) -> Option<f64> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<f64> {
        self.bounds.map(|(_, max)| max)
    }

    pub fn is_initialized(&self) -> bool {
        self.bounds.is_some()
    }

    /// Widen the range to include `raw`
    pub fn observe(&mut self, raw: f64) {
        self.bounds = Some(match self.bounds {
            None => (raw, raw),
            Some((min, max)) => (min.min(raw), max.max(raw)),
        });
    }

    /// Capture `raw` as the lower bound
    pub fn snapshot_min(&mut self, raw: f64) {
        self.bounds = Some(match self.bounds {
            None => (raw, raw),
            Some((_, max)) => (raw, max),
        });
    }

    /// Capture `raw` as the upper bound
    pub fn snapshot_max(&mut self, raw: f64) {
        self.bounds = Some(match self.bounds {
            None => (raw, raw),
            Some((min, _)) => (min, raw),
        });
    }

    pub fn reset(&mut self) {
        self.bounds = None;
    }

    /// Map `raw` into the range, inverted so `max` gives 0 and `min` gives 1.
    ///
    /// Yields 0 until both bounds are positive and distinct.
    pub fn normalize(&self, raw: f64) -> f64 {
        match self.bounds {
            Some((min, max)) if max > 0.0 && min > 0.0 && max > min => (max - raw) / (max - min),
            _ => 0.0,
        }
    }
}

/// Normalized lens output for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LensReading {
    pub zoom: f64,
    pub focus: f64,
}

/// Calibration state for zoom and focus
#[derive(Debug, Clone, Default)]
pub struct LensCalibrator {
    mode: CalibrationMode,
    zoom: CalibrationRange,
    focus: CalibrationRange,
    last_zoom: Option<f64>,
    last_focus: Option<f64>,
}

impl LensCalibrator {
    pub fn new(mode: CalibrationMode) -> Self {
        Self { mode, ..Default::default() }
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    /// Switch strategy. Existing ranges are kept.
    pub fn set_mode(&mut self, mode: CalibrationMode) {
        self.mode = mode;
    }

    pub fn range(&self, channel: LensChannel) -> &CalibrationRange {
        match channel {
            LensChannel::Zoom => &self.zoom,
            LensChannel::Focus => &self.focus,
        }
    }

    fn range_mut(&mut self, channel: LensChannel) -> &mut CalibrationRange {
        match channel {
            LensChannel::Zoom => &mut self.zoom,
            LensChannel::Focus => &mut self.focus,
        }
    }

    /// Last unbiased reading of a channel
    pub fn last_raw(&self, channel: LensChannel) -> Option<f64> {
        match channel {
            LensChannel::Zoom => self.last_zoom,
            LensChannel::Focus => self.last_focus,
        }
    }

    /// Forget a channel's range so it recalibrates from the next readings
    pub fn reset(&mut self, channel: LensChannel) {
        self.range_mut(channel).reset();
    }

    /// Capture the last reading as the channel's minimum. Returns false if
    /// nothing has been read yet.
    pub fn snapshot_min(&mut self, channel: LensChannel) -> bool {
        match self.last_raw(channel) {
            Some(raw) => {
                self.range_mut(channel).snapshot_min(raw);
                true
            }
            None => false,
        }
    }

    /// Capture the last reading as the channel's maximum
    pub fn snapshot_max(&mut self, channel: LensChannel) -> bool {
        match self.last_raw(channel) {
            Some(raw) => {
                self.range_mut(channel).snapshot_max(raw);
                true
            }
            None => false,
        }
    }

    fn calibrate(&mut self, channel: LensChannel, raw: f64) -> f64 {
        let mode = self.mode;
        let range = self.range_mut(channel);
        match mode {
            CalibrationMode::AutoRange => {
                range.observe(raw);
                range.normalize(raw)
            }
            CalibrationMode::Manual => range.normalize(raw).clamp(0.0, 1.0),
        }
    }

    /// Update ranges from a frame and return normalized zoom and focus
    pub fn process(&mut self, frame: &Frame) -> LensReading {
        let zoom_raw = lens_raw(frame, LensChannel::Zoom);
        let focus_raw = lens_raw(frame, LensChannel::Focus);
        self.last_zoom = Some(zoom_raw);
        self.last_focus = Some(focus_raw);

        LensReading {
            zoom: self.calibrate(LensChannel::Zoom, zoom_raw),
            focus: self.calibrate(LensChannel::Focus, focus_raw),
        }
    }
}
