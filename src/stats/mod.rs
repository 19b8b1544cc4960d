//! Session statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time statistics snapshot for a stream session
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Total bytes pulled from the chunk source
    pub bytes_read: u64,
    /// Chunks pulled from the chunk source
    pub chunks: u64,
    /// Frames delivered to the event channel (JPEG stills or decoded frames)
    pub frames_emitted: u64,
    /// Frames shed because the event channel was full
    pub frames_dropped: u64,
    /// Complete NAL units demuxed (AVC streams only)
    pub nal_units: u64,
    /// IDR units seen (AVC streams only)
    pub key_units: u64,
    /// Decoder configure/decode failures
    pub decode_errors: u64,
    /// Time since the session was created
    pub duration: Duration,
}

impl StreamStats {
    /// Observed frame rate over the session lifetime
    pub fn observed_fps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.frames_emitted as f64 / secs
        } else {
            0.0
        }
    }

    /// Ingest bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_read * 8) / secs
        } else {
            0
        }
    }
}

/// Lock-free counters updated from the read loop and decoder callbacks
#[derive(Debug)]
pub(crate) struct Counters {
    started_at: Instant,
    pub bytes_read: AtomicU64,
    pub chunks: AtomicU64,
    pub frames_emitted: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub nal_units: AtomicU64,
    pub key_units: AtomicU64,
    pub decode_errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_read: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            nal_units: AtomicU64::new(0),
            key_units: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            nal_units: self.nal_units.load(Ordering::Relaxed),
            key_units: self.key_units.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}
