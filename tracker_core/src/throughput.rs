/*!
Frame rate measurement.

Frames are counted per wall-clock second. The count is published when the
first frame of a later second arrives, so seconds without any frames publish
nothing and simply do not appear in the history.
*/

use std::collections::VecDeque;
use chrono::Utc;
use crate::protocol::THROUGHPUT_HISTORY_LEN;

/// Source of calendar seconds
pub trait Clock: Send {
    /// Whole seconds since the Unix epoch
    fn now_second(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_second(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A published rate measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    /// Frames counted in the last completed second
    pub fps: f64,
    /// Mean of the retained per-second counts
    pub fps_avg: f64,
}

/// Per-second frame counter with a bounded rolling average
#[derive(Debug, Clone, Default)]
pub struct ThroughputMeter {
    current_second: Option<i64>,
    count: u32,
    history: VecDeque<u32>,
    latest: Option<Rate>,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame decoded during `second`.
    ///
    /// Returns the new rate when this frame opens a new second.
    pub fn record(&mut self, second: i64) -> Option<Rate> {
        let mut published = None;

        if let Some(previous) = self.current_second {
            if previous != second {
                published = Some(self.publish());
            }
        }

        self.current_second = Some(second);
        self.count += 1;
        published
    }

    fn publish(&mut self) -> Rate {
        let fps = self.count;
        self.history.push_back(fps);
        while self.history.len() > THROUGHPUT_HISTORY_LEN {
            self.history.pop_front();
        }
        self.count = 0;

        let total: u64 = self.history.iter().map(|&c| u64::from(c)).sum();
        let rate = Rate {
            fps: f64::from(fps),
            fps_avg: total as f64 / self.history.len() as f64,
        };
        self.latest = Some(rate);
        rate
    }

    /// Most recently published rate
    pub fn latest(&self) -> Option<Rate> {
        self.latest
    }

    /// Retained per-second counts, oldest first
    pub fn history(&self) -> impl Iterator<Item = u32> + '_ {
        self.history.iter().copied()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `counts[i]` frames during second `i`, then one frame to close the last second
    fn run(meter: &mut ThroughputMeter, counts: &[u32]) -> Vec<Rate> {
        let mut published = Vec::new();
        for (second, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                published.extend(meter.record(second as i64));
            }
        }
        published.extend(meter.record(counts.len() as i64));
        published
    }

    #[test]
    fn test_first_second_publishes_nothing() {
        let mut meter = ThroughputMeter::new();
        for _ in 0..10 {
            assert_eq!(meter.record(100), None);
        }
        assert_eq!(meter.latest(), None);
    }

    #[test]
    fn test_rollover_frame_counts_toward_new_second() {
        let mut meter = ThroughputMeter::new();
        let rates = run(&mut meter, &[3, 5]);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].fps, 3.0);
        assert_eq!(rates[1].fps, 5.0);
        assert_eq!(rates[1].fps_avg, 4.0);

        // One frame already counted in second 2
        assert_eq!(meter.record(3), Some(Rate { fps: 1.0, fps_avg: 3.0 }));
    }

    #[test]
    fn test_average_over_partial_history() {
        let mut meter = ThroughputMeter::new();
        let rates = run(&mut meter, &[10, 20, 30, 40]);
        assert_eq!(rates.last().unwrap().fps_avg, 25.0);
    }

    #[test]
    fn test_average_uses_last_eleven_seconds_only() {
        let mut meter = ThroughputMeter::new();
        let counts: Vec<u32> = (1..=15).collect();
        let rates = run(&mut meter, &counts);

        assert_eq!(meter.history().count(), 11);
        assert_eq!(meter.history().next(), Some(5));
        // mean(5..=15) = 10
        assert_eq!(rates.last().unwrap().fps_avg, 10.0);
        assert_eq!(rates.last().unwrap().fps, 15.0);
    }

    #[test]
    fn test_idle_seconds_are_skipped() {
        let mut meter = ThroughputMeter::new();
        meter.record(0);
        meter.record(0);
        let rate = meter.record(7).unwrap();
        assert_eq!(rate.fps, 2.0);
        assert_eq!(meter.history().collect::<Vec<_>>(), vec![2]);
    }
}
