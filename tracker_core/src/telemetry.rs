/*!
Output channels and the state shared between the decode path and samplers.

The decode path is the only writer of [`TelemetrySample`]; samplers are the
only writers of offsets, device identity and commands. Each sample is
replaced as a whole under a lock, so a reader never sees new rotation with
stale translation.
*/

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::decoder::Command;
use crate::lens::LensReading;
use crate::pose::{Pose, PoseOffsets};
use crate::sync::SyncStats;
use crate::throughput::Rate;

/// Output channel names, in publication order
pub const CHANNEL_NAMES: [&str; 10] = [
    "tx", "ty", "tz", "rx", "ry", "rz", "zoom", "focus", "fps", "fps_avg",
];

/// The latest value of every output channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub zoom: f64,
    pub focus: f64,
    pub fps: f64,
    pub fps_avg: f64,
}

impl TelemetrySample {
    /// Replace pose and lens channels, keeping rate channels
    pub fn with_frame(self, pose: Pose, lens: LensReading) -> Self {
        Self {
            tx: pose.tx,
            ty: pose.ty,
            tz: pose.tz,
            rx: pose.rx,
            ry: pose.ry,
            rz: pose.rz,
            zoom: lens.zoom,
            focus: lens.focus,
            ..self
        }
    }

    /// Replace rate channels
    pub fn with_rate(self, rate: Rate) -> Self {
        Self { fps: rate.fps, fps_avg: rate.fps_avg, ..self }
    }

    /// Channel values in [`CHANNEL_NAMES`] order
    pub fn values(&self) -> [f64; 10] {
        [
            self.tx, self.ty, self.tz, self.rx, self.ry, self.rz,
            self.zoom, self.focus, self.fps, self.fps_avg,
        ]
    }

    /// `(name, value)` pairs
    pub fn channels(&self) -> impl Iterator<Item = (&'static str, f64)> {
        CHANNEL_NAMES.into_iter().zip(self.values())
    }

    /// Look up a channel by name
    pub fn channel(&self, name: &str) -> Option<f64> {
        self.channels().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

/// Whether bytes are currently flowing from the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LinkStatus {
    /// No session has been started
    #[default]
    Idle,
    /// A decode loop is reading from a source
    Streaming,
    /// The source failed; no frames are produced until a restart
    Failed(String),
    /// The source ended or the loop was stopped
    Stopped,
}

impl LinkStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

struct Shared {
    sample: RwLock<TelemetrySample>,
    offsets: RwLock<PoseOffsets>,
    device_id: AtomicU8,
    link: RwLock<LinkStatus>,
    stats: RwLock<SyncStats>,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
}

/// Cloneable handle to the shared telemetry state
#[derive(Clone)]
pub struct TelemetryState {
    inner: Arc<Shared>,
}

impl TelemetryState {
    pub fn new(device_id: u8, offsets: PoseOffsets) -> Self {
        let (commands_tx, commands_rx) = unbounded();
        Self {
            inner: Arc::new(Shared {
                sample: RwLock::new(TelemetrySample::default()),
                offsets: RwLock::new(offsets),
                device_id: AtomicU8::new(device_id),
                link: RwLock::new(LinkStatus::Idle),
                stats: RwLock::new(SyncStats::default()),
                commands_tx,
                commands_rx,
            }),
        }
    }

    /// Latest complete sample
    pub fn snapshot(&self) -> TelemetrySample {
        *self.inner.sample.read()
    }

    /// Replace the sample in one step
    pub fn publish(&self, sample: TelemetrySample) {
        *self.inner.sample.write() = sample;
    }

    pub fn offsets(&self) -> PoseOffsets {
        *self.inner.offsets.read()
    }

    /// Replace both offset vectors together
    pub fn set_offsets(&self, offsets: PoseOffsets) {
        *self.inner.offsets.write() = offsets;
    }

    pub fn device_id(&self) -> u8 {
        self.inner.device_id.load(Ordering::Acquire)
    }

    pub fn set_device_id(&self, device_id: u8) {
        self.inner.device_id.store(device_id, Ordering::Release);
    }

    /// Queue a command for the decode path
    pub fn issue_command(&self, command: Command) {
        // Both ends live in `Shared`, so the channel cannot be disconnected
        let _ = self.inner.commands_tx.send(command);
    }

    /// Commands queued since the last call
    pub fn drain_commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.inner.commands_rx.try_iter()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.inner.link.read().clone()
    }

    pub fn set_link_status(&self, status: LinkStatus) {
        *self.inner.link.write() = status;
    }

    /// Synchronizer counters of the current session
    pub fn stats(&self) -> SyncStats {
        *self.inner.stats.read()
    }

    pub fn set_stats(&self, stats: SyncStats) {
        *self.inner.stats.write() = stats;
    }
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new(crate::protocol::DEFAULT_DEVICE_ID, PoseOffsets::default())
    }
}

impl std::fmt::Debug for TelemetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryState")
            .field("sample", &self.snapshot())
            .field("offsets", &self.offsets())
            .field("device_id", &self.device_id())
            .field("link", &self.link_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_channel_order() {
        let sample = TelemetrySample {
            tx: 1.0, ty: 2.0, tz: 3.0, rx: 4.0, ry: 5.0, rz: 6.0,
            zoom: 7.0, focus: 8.0, fps: 9.0, fps_avg: 10.0,
        };
        for (i, (name, value)) in sample.channels().enumerate() {
            assert_eq!(name, CHANNEL_NAMES[i]);
            assert_eq!(value, (i + 1) as f64);
        }
        assert_eq!(sample.channel("fps_avg"), Some(10.0));
        assert_eq!(sample.channel("nope"), None);
    }

    #[test]
    fn test_with_frame_keeps_rate() {
        let sample = TelemetrySample::default().with_rate(Rate { fps: 50.0, fps_avg: 49.5 });
        let pose = Pose { rx: 1.0, ..Default::default() };
        let updated = sample.with_frame(pose, LensReading { zoom: 0.5, focus: 0.25 });
        assert_eq!(updated.fps, 50.0);
        assert_eq!(updated.fps_avg, 49.5);
        assert_eq!(updated.rx, 1.0);
        assert_eq!(updated.zoom, 0.5);
    }

    #[test]
    fn test_commands_are_drained_in_order() {
        let state = TelemetryState::default();
        state.issue_command(Command::ResetZoom);
        state.issue_command(Command::SnapshotFocusMax);
        let drained: Vec<Command> = state.drain_commands().collect();
        assert_eq!(drained, vec![Command::ResetZoom, Command::SnapshotFocusMax]);
        assert_eq!(state.drain_commands().count(), 0);
    }

    #[test]
    fn test_readers_never_see_torn_samples() {
        let state = TelemetryState::default();
        let writer_state = state.clone();

        let writer = thread::spawn(move || {
            for i in 0..20_000 {
                let v = f64::from(i);
                writer_state.publish(TelemetrySample {
                    tx: v, ty: v, tz: v, rx: v, ry: v, rz: v,
                    zoom: v, focus: v, fps: v, fps_avg: v,
                });
            }
        });

        for _ in 0..20_000 {
            let values = state.snapshot().values();
            assert!(values.iter().all(|&v| v == values[0]));
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_link_status_serializes_tagged() {
        let json = serde_json::to_string(&LinkStatus::Failed("port gone".into())).unwrap();
        assert_eq!(json, r#"{"state":"failed","reason":"port gone"}"#);
    }
}
