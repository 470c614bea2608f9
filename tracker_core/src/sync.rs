/*!
Marker-based frame synchronization state machine.

Bytes arrive in arbitrary chunks (possibly empty, possibly a single byte).
The synchronizer scans for the `0xD1` marker, collects the next 28 bytes and
validates the result. Partial frames carry over between calls, so a frame
split across any number of chunks is reassembled transparently.

A rejected frame resets the machine to scanning. The byte that completed the
rejected frame is not re-examined as a marker, so if the real marker was
buried inside that window resynchronization can take up to one extra frame.
*/

use tracing::debug;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::protocol::{FRAME_LEN, SYNC_MARKER};

/// Frame synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Looking for the sync marker
    Scanning,
    /// Marker seen, `position` bytes buffered (1..29)
    Collecting { position: usize },
}

/// Running counters for a synchronizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Every byte passed to `feed`
    pub bytes_seen: u64,
    /// Bytes dropped while scanning for a marker
    pub bytes_discarded: u64,
    /// Frames that passed validation
    pub frames_emitted: u64,
    pub device_mismatches: u64,
    pub checksum_errors: u64,
}

impl SyncStats {
    /// Total frames rejected for any reason
    pub fn frames_rejected(&self) -> u64 {
        self.device_mismatches + self.checksum_errors
    }
}

/// Streaming frame synchronizer
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    buffer: [u8; FRAME_LEN],
    position: usize,
    device_id: u8,
    stats: SyncStats,
}

impl FrameSynchronizer {
    /// Create a synchronizer accepting frames from `device_id`
    pub fn new(device_id: u8) -> Self {
        Self {
            buffer: [0u8; FRAME_LEN],
            position: 0,
            device_id,
            stats: SyncStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        if self.position == 0 {
            SyncState::Scanning
        } else {
            SyncState::Collecting { position: self.position }
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Change the accepted device identity. Applies from the next completed frame.
    pub fn set_device_id(&mut self, device_id: u8) {
        self.device_id = device_id;
    }

    /// Bytes of the frame currently being collected
    pub fn pending(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Drop any partial frame and counters
    pub fn reset(&mut self) {
        self.position = 0;
        self.stats = SyncStats::default();
    }

    /// Feed a chunk, lazily yielding every frame it completes.
    ///
    /// Bytes are consumed only as the iterator is advanced; dropping the
    /// iterator early leaves the unread tail of `chunk` unprocessed.
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Frames<'a> {
        Frames { sync: self, chunk, index: 0 }
    }

    /// Process one byte, returning a frame when it completes a valid one
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.stats.bytes_seen += 1;

        if self.position == 0 {
            if byte != SYNC_MARKER {
                self.stats.bytes_discarded += 1;
                return None;
            }
            self.buffer[0] = byte;
            self.position = 1;
            return None;
        }

        self.buffer[self.position] = byte;
        self.position += 1;

        if self.position < FRAME_LEN {
            return None;
        }

        self.position = 0;
        let frame = Frame::from_bytes(self.buffer);
        match frame.validate(self.device_id) {
            Ok(()) => {
                self.stats.frames_emitted += 1;
                Some(frame)
            }
            Err(e) => {
                match e {
                    FrameError::DeviceMismatch { .. } => self.stats.device_mismatches += 1,
                    FrameError::Checksum { .. } => self.stats.checksum_errors += 1,
                    FrameError::InvalidLength(_) => {}
                }
                debug!("Rejected frame {}: {}", hex::encode(frame.as_bytes()), e);
                None
            }
        }
    }
}

/// Iterator over the frames completed by one chunk
pub struct Frames<'a> {
    sync: &'a mut FrameSynchronizer,
    chunk: &'a [u8],
    index: usize,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        while self.index < self.chunk.len() {
            let byte = self.chunk[self.index];
            self.index += 1;
            if let Some(frame) = self.sync.push(byte) {
                return Some(frame);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Field, FrameBuilder};

    fn sample_frame(zoom: u32) -> Frame {
        FrameBuilder::new(1)
            .field(Field::RotateX, 32768)
            .field(Field::Zoom, zoom)
            .build()
    }

    #[test]
    fn test_garbage_before_frame_is_ignored() {
        let frame = sample_frame(0x90000);
        let mut stream = vec![0x00, 0x13, 0xFF, 0x42, 0xD0, 0x7E];
        stream.extend_from_slice(frame.as_bytes());

        let mut sync = FrameSynchronizer::new(1);
        let frames: Vec<Frame> = sync.feed(&stream).collect();

        assert_eq!(frames, vec![frame]);
        assert_eq!(sync.stats().bytes_discarded, 6);
        assert_eq!(sync.state(), SyncState::Scanning);
    }

    #[test]
    fn test_frame_split_across_single_byte_chunks() {
        let frame = sample_frame(0x90000);
        let mut sync = FrameSynchronizer::new(1);
        let mut frames = Vec::new();

        for byte in frame.as_bytes() {
            frames.extend(sync.feed(&[]));
            frames.extend(sync.feed(std::slice::from_ref(byte)));
        }

        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_partial_frame_survives_between_calls() {
        let frame = sample_frame(0x90000);
        let bytes = frame.as_bytes();
        let mut sync = FrameSynchronizer::new(1);

        assert_eq!(sync.feed(&bytes[..10]).count(), 0);
        assert_eq!(sync.state(), SyncState::Collecting { position: 10 });
        assert_eq!(sync.pending(), &bytes[..10]);
        assert_eq!(sync.feed(&bytes[10..]).collect::<Vec<_>>(), vec![frame]);
    }

    #[test]
    fn test_consecutive_frames_in_one_chunk() {
        let first = sample_frame(0x90000);
        let second = sample_frame(0xA0000);
        let mut stream = first.as_bytes().to_vec();
        stream.extend_from_slice(second.as_bytes());

        let mut sync = FrameSynchronizer::new(1);
        assert_eq!(sync.feed(&stream).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(sync.stats().frames_emitted, 2);
    }

    #[test]
    fn test_flipped_payload_byte_is_rejected() {
        let frame = sample_frame(0x90000);
        let mut bytes = *frame.as_bytes();
        bytes[6] ^= 0x01;

        let mut sync = FrameSynchronizer::new(1);
        assert_eq!(sync.feed(&bytes).count(), 0);
        assert_eq!(sync.stats().checksum_errors, 1);
        assert_eq!(sync.state(), SyncState::Scanning);
    }

    #[test]
    fn test_foreign_device_is_rejected() {
        let frame = FrameBuilder::new(2).build();
        let mut sync = FrameSynchronizer::new(1);
        assert_eq!(sync.feed(frame.as_bytes()).count(), 0);
        assert_eq!(sync.stats().device_mismatches, 1);

        sync.set_device_id(2);
        assert_eq!(sync.feed(frame.as_bytes()).count(), 1);
    }

    #[test]
    fn test_completing_byte_of_rejected_frame_is_not_rescanned() {
        // A stray marker starts a bogus frame whose 29th byte is the real marker
        let frame = sample_frame(0x90000);
        let mut stream = vec![SYNC_MARKER];
        stream.extend(std::iter::repeat(0x00).take(27));
        stream.extend_from_slice(frame.as_bytes());

        let mut sync = FrameSynchronizer::new(1);
        assert_eq!(sync.feed(&stream).count(), 0);
        assert_eq!(sync.stats().frames_rejected(), 1);

        // The next aligned frame is picked up
        assert_eq!(sync.feed(frame.as_bytes()).collect::<Vec<_>>(), vec![frame]);
    }

    #[test]
    fn test_dropping_iterator_leaves_tail_unprocessed() {
        let first = sample_frame(0x90000);
        let second = sample_frame(0xA0000);
        let mut stream = first.as_bytes().to_vec();
        stream.extend_from_slice(second.as_bytes());

        let mut sync = FrameSynchronizer::new(1);
        assert_eq!(sync.feed(&stream).next(), Some(first));
        assert_eq!(sync.stats().bytes_seen, 29);
        assert_eq!(sync.state(), SyncState::Scanning);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let frame = sample_frame(0x90000);
        let mut sync = FrameSynchronizer::new(1);
        sync.feed(&frame.as_bytes()[..20]).for_each(drop);
        sync.reset();
        assert_eq!(sync.state(), SyncState::Scanning);
        assert_eq!(sync.feed(&frame.as_bytes()[20..]).count(), 0);
    }
}
