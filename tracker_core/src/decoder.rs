/*!
The decode path: bytes in, one published [`TelemetrySample`] per frame out.
*/

use tracing::{debug, info};
use crate::config::TrackerConfig;
use crate::lens::{CalibrationMode, LensCalibrator, LensChannel};
use crate::pose::assemble;
use crate::sync::{FrameSynchronizer, SyncStats};
use crate::telemetry::{TelemetrySample, TelemetryState};
use crate::throughput::{Clock, SystemClock, ThroughputMeter};

/// Operator commands, applied by the decode path on its next feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Forget the zoom range
    ResetZoom,
    /// Forget the focus range
    ResetFocus,
    /// Capture the current zoom reading as the minimum (manual mode)
    SnapshotZoomMin,
    /// Capture the current zoom reading as the maximum (manual mode)
    SnapshotZoomMax,
    /// Capture the current focus reading as the minimum (manual mode)
    SnapshotFocusMin,
    /// Capture the current focus reading as the maximum (manual mode)
    SnapshotFocusMax,
    /// Switch calibration strategy, keeping current ranges
    SetCalibrationMode(CalibrationMode),
}

/// Frame synchronizer, calibration and rate measurement for one tracker
pub struct Decoder {
    sync: FrameSynchronizer,
    lens: LensCalibrator,
    meter: ThroughputMeter,
    clock: Box<dyn Clock>,
    state: TelemetryState,
    current: TelemetrySample,
}

impl Decoder {
    /// Create a decoder publishing into `state`.
    ///
    /// The device identity and offsets in `config` are written to `state`,
    /// which remains the source of truth for both afterwards.
    pub fn new(config: &TrackerConfig, state: TelemetryState) -> Self {
        state.set_device_id(config.device_id);
        state.set_offsets(config.offsets);
        Self {
            sync: FrameSynchronizer::new(config.device_id),
            lens: LensCalibrator::new(config.calibration),
            meter: ThroughputMeter::new(),
            clock: Box::new(SystemClock),
            current: state.snapshot(),
            state,
        }
    }

    /// Replace the wall clock used for rate measurement
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> &TelemetryState {
        &self.state
    }

    pub fn lens(&self) -> &LensCalibrator {
        &self.lens
    }

    pub fn meter(&self) -> &ThroughputMeter {
        &self.meter
    }

    pub fn stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Apply a command immediately
    pub fn apply(&mut self, command: Command) {
        let lens = &mut self.lens;
        let manual = lens.mode() == CalibrationMode::Manual;
        match command {
            Command::ResetZoom => lens.reset(LensChannel::Zoom),
            Command::ResetFocus => lens.reset(LensChannel::Focus),
            Command::SetCalibrationMode(mode) => {
                info!("Calibration mode set to {:?}", mode);
                lens.set_mode(mode);
            }
            Command::SnapshotZoomMin
            | Command::SnapshotZoomMax
            | Command::SnapshotFocusMin
            | Command::SnapshotFocusMax
                if !manual =>
            {
                debug!("Ignoring {:?} outside manual calibration", command);
            }
            Command::SnapshotZoomMin => snapshot(lens.snapshot_min(LensChannel::Zoom), command),
            Command::SnapshotZoomMax => snapshot(lens.snapshot_max(LensChannel::Zoom), command),
            Command::SnapshotFocusMin => snapshot(lens.snapshot_min(LensChannel::Focus), command),
            Command::SnapshotFocusMax => snapshot(lens.snapshot_max(LensChannel::Focus), command),
        }
    }

    /// Consume a chunk of bytes, publishing a sample for every valid frame.
    ///
    /// Returns the number of frames decoded.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let pending: Vec<_> = self.state.drain_commands().collect();
        for command in pending {
            self.apply(command);
        }

        let device_id = self.state.device_id();
        if device_id != self.sync.device_id() {
            info!("Expected device id changed {} -> {}", self.sync.device_id(), device_id);
            self.sync.set_device_id(device_id);
        }

        let mut decoded = 0;
        for frame in self.sync.feed(bytes) {
            let offsets = self.state.offsets();
            let pose = assemble(&frame, &offsets);
            let lens = self.lens.process(&frame);

            let mut sample = self.current.with_frame(pose, lens);
            if let Some(rate) = self.meter.record(self.clock.now_second()) {
                sample = sample.with_rate(rate);
            }

            self.current = sample;
            self.state.publish(sample);
            decoded += 1;
        }

        if !bytes.is_empty() {
            self.state.set_stats(self.sync.stats());
        }
        decoded
    }

    /// Forget everything tied to the current byte stream.
    ///
    /// Partial frames, counters and rate history are dropped. Calibration
    /// ranges and offsets are kept.
    pub fn reset_stream(&mut self) {
        self.sync.reset();
        self.meter.reset();
        self.state.set_stats(SyncStats::default());
    }
}

fn snapshot(captured: bool, command: Command) {
    if !captured {
        debug!("{:?} ignored: no lens reading yet", command);
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("sync", &self.sync)
            .field("lens", &self.lens)
            .field("meter", &self.meter)
            .field("current", &self.current)
            .finish()
    }
}
