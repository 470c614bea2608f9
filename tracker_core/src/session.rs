/*!
Background decode loop.

A [`DecodeLoop`] owns a [`ByteSource`] and a [`Decoder`] on a dedicated
thread. The only blocking point is [`ByteSource::read_chunk`], which must be
bounded by a timeout so that a stop request is noticed promptly.

Restart policy: stopping a loop hands the decoder back with its stream state
(partial frame, counters, rate history) discarded. Calibration ranges and
offsets are kept, so a decoder can be started again on a new source.
*/

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use crate::decoder::Decoder;
use crate::error::{Result, TrackerError};
use crate::telemetry::{LinkStatus, TelemetryState};

/// Size of the buffer handed to each read. Large enough for any UDP
/// payload, since a datagram source drops whatever does not fit.
const READ_BUFFER_LEN: usize = 64 * 1024;

/// A transport delivering raw bytes in arbitrary chunks.
///
/// `Ok(0)` means nothing arrived this time. `TimedOut`, `WouldBlock` and
/// `Interrupted` errors are treated the same way. `UnexpectedEof` ends the
/// session normally; any other error ends it as a transport failure.
pub trait ByteSource: Send {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Human readable name for logs
    fn describe(&self) -> String;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Replays a byte buffer in fixed-size chunks, then reports end of stream
#[derive(Debug, Clone)]
pub struct ReplaySource {
    data: Vec<u8>,
    chunk_len: usize,
    position: usize,
    delay: Option<Duration>,
}

impl ReplaySource {
    pub fn new(data: Vec<u8>, chunk_len: usize) -> Self {
        Self { data, chunk_len: chunk_len.max(1), position: 0, delay: None }
    }

    /// Sleep before every chunk to approximate a live stream
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl ByteSource for ReplaySource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "replay finished"));
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let n = self.chunk_len.min(buf.len()).min(self.data.len() - self.position);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn describe(&self) -> String {
        format!("replay ({} bytes)", self.data.len())
    }
}

/// Counters for one decode session
#[derive(Debug, Clone, Copy, Default)]
struct SessionStats {
    reads: u64,
    bytes: u64,
    frames: u64,
    idle_reads: u64,
}

/// Handle to a running decode thread
pub struct DecodeLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Decoder>>,
    state: TelemetryState,
    source_name: String,
}

impl DecodeLoop {
    /// Spawn a thread feeding bytes from `source` into `decoder`
    pub fn start<S: ByteSource + 'static>(source: S, decoder: Decoder) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let state = decoder.state().clone();
        let source_name = source.describe();

        state.set_link_status(LinkStatus::Streaming);

        let running_thread = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("tracker-decode".to_string())
            .spawn(move || Self::run(source, decoder, running_thread))
            .map_err(|e| {
                state.set_link_status(LinkStatus::Failed(e.to_string()));
                TrackerError::from(e)
            })?;

        info!("Decode loop started on {}", source_name);
        Ok(Self { running, handle: Some(handle), state, source_name })
    }

    /// Flag that keeps the loop alive; clearing it requests a stop
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn state(&self) -> &TelemetryState {
        &self.state
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// True once the thread has exited (source ended, failed or stopped)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until the thread exits or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Stop the thread and take back its decoder
    pub fn stop(mut self) -> Result<Decoder> {
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| TrackerError::transport("decode loop already joined"))?;
        handle.join().map_err(|_| {
            self.state.set_link_status(LinkStatus::Failed("decode thread panicked".into()));
            TrackerError::transport("decode thread panicked")
        })
    }

    /// Stop this loop and start a fresh one on `source` with the same decoder
    pub fn restart<S: ByteSource + 'static>(self, source: S) -> Result<Self> {
        let decoder = self.stop()?;
        Self::start(source, decoder)
    }

    fn run<S: ByteSource>(mut source: S, mut decoder: Decoder, running: Arc<AtomicBool>) -> Decoder {
        let state = decoder.state().clone();
        let mut buffer = vec![0u8; READ_BUFFER_LEN];
        let mut stats = SessionStats::default();
        let started = Instant::now();
        let mut outcome = LinkStatus::Stopped;

        while running.load(Ordering::SeqCst) {
            match source.read_chunk(&mut buffer) {
                Ok(0) => stats.idle_reads += 1,
                Ok(n) => {
                    stats.reads += 1;
                    stats.bytes += n as u64;
                    stats.frames += decoder.feed(&buffer[..n]) as u64;
                }
                Err(e) if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => stats.idle_reads += 1,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("{} reached end of stream", source.describe());
                    break;
                }
                Err(e) => {
                    error!("Read from {} failed: {}", source.describe(), e);
                    outcome = LinkStatus::Failed(e.to_string());
                    break;
                }
            }
        }

        let sync = decoder.stats();
        info!("Decode session on {} finished:", source.describe());
        info!("   Duration: {:.1}s", started.elapsed().as_secs_f64());
        info!("   Reads: {} ({} idle)", stats.reads, stats.idle_reads);
        info!("   Bytes: {} ({} discarded while scanning)", stats.bytes, sync.bytes_discarded);
        info!("   Frames: {} decoded, {} rejected", stats.frames, sync.frames_rejected());
        if sync.frames_rejected() > 0 {
            warn!(
                "   Rejections: {} device id, {} checksum",
                sync.device_mismatches, sync.checksum_errors
            );
        }

        state.set_link_status(outcome);
        decoder.reset_stream();
        decoder
    }
}

impl Drop for DecodeLoop {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for DecodeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeLoop")
            .field("source", &self.source_name)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::frame::{Field, FrameBuilder};
    use crate::lens::LensChannel;

    /// Never delivers anything, like an idle serial line
    struct SilentSource;

    impl ByteSource for SilentSource {
        fn read_chunk(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(10));
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }

        fn describe(&self) -> String {
            "silent".to_string()
        }
    }

    struct BrokenSource;

    impl ByteSource for BrokenSource {
        fn read_chunk(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    /// Hands out whole messages and drops any excess, like UDP `recv`
    struct DatagramSource {
        datagrams: Vec<Vec<u8>>,
    }

    impl ByteSource for DatagramSource {
        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.datagrams.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no more datagrams"));
            }
            let datagram = self.datagrams.remove(0);
            let n = datagram.len().min(buf.len());
            buf[..n].copy_from_slice(&datagram[..n]);
            Ok(n)
        }

        fn describe(&self) -> String {
            "datagrams".to_string()
        }
    }

    fn stream(zooms: &[u32]) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x55];
        for &zoom in zooms {
            let frame = FrameBuilder::new(1)
                .field(Field::RotateY, 16384)
                .field(Field::Zoom, 0x80000 + zoom)
                .build();
            bytes.extend_from_slice(frame.as_bytes());
        }
        bytes
    }

    #[test]
    fn test_replay_decodes_every_frame() {
        let state = TelemetryState::default();
        let decoder = Decoder::new(&TrackerConfig::default(), state.clone());
        let source = ReplaySource::new(stream(&[100, 400, 250]), 7);

        let session = DecodeLoop::start(source, decoder).unwrap();
        assert!(session.wait(Duration::from_secs(5)));
        let decoder = session.stop().unwrap();

        let sample = state.snapshot();
        assert_eq!(sample.ry, 0.5);
        assert_eq!(sample.zoom, 0.5);
        assert_eq!(state.link_status(), LinkStatus::Stopped);
        assert_eq!(decoder.lens().range(LensChannel::Zoom).max(), Some(400.0));
        assert_eq!(decoder.stats().frames_emitted, 0);
    }

    #[test]
    fn test_stop_is_prompt_on_idle_source() {
        let decoder = Decoder::new(&TrackerConfig::default(), TelemetryState::default());
        let session = DecodeLoop::start(SilentSource, decoder).unwrap();
        assert!(session.state().link_status().is_streaming());

        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        session.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_transport_failure_is_reported_not_fatal() {
        let state = TelemetryState::default();
        let decoder = Decoder::new(&TrackerConfig::default(), state.clone());
        let session = DecodeLoop::start(BrokenSource, decoder).unwrap();
        assert!(session.wait(Duration::from_secs(5)));

        assert!(matches!(state.link_status(), LinkStatus::Failed(reason) if reason.contains("unplugged")));

        // The same decoder can be restarted on a working source
        let session = session.restart(ReplaySource::new(stream(&[10]), 64)).unwrap();
        assert!(session.wait(Duration::from_secs(5)));
        assert_eq!(state.snapshot().ry, 0.5);
        assert_eq!(state.link_status(), LinkStatus::Stopped);
    }

    #[test]
    fn test_large_datagram_is_decoded_whole() {
        let mut datagram = Vec::new();
        for i in 0..60 {
            let frame = FrameBuilder::new(1).field(Field::RotateX, i).build();
            datagram.extend_from_slice(frame.as_bytes());
        }
        assert!(datagram.len() > 1024);

        let state = TelemetryState::default();
        let decoder = Decoder::new(&TrackerConfig::default(), state.clone());
        let source = DatagramSource { datagrams: vec![datagram] };

        let session = DecodeLoop::start(source, decoder).unwrap();
        assert!(session.wait(Duration::from_secs(5)));
        session.stop().unwrap();

        // The last frame sits at the far end of the datagram
        assert_eq!(state.snapshot().rx, 59.0 / 32768.0);
        assert_eq!(state.link_status(), LinkStatus::Stopped);
    }
}
