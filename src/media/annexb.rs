//! Annex-B H.264 elementary stream demuxing
//!
//! The device streams raw H.264 as an Annex-B byte stream: NAL units
//! separated by byte-aligned start codes.
//!
//! ```text
//! Start code forms:
//! - 4 bytes: 00 00 00 01
//! - 3 bytes: 00 00 01
//!
//! Stream layout:
//! | start code | NAL unit | start code | NAL unit | ... | trailing bytes
//! ```
//!
//! Chunk boundaries are arbitrary, so a NAL unit is only known to be
//! complete once the *next* start code has been seen. The trailing unit
//! therefore stays buffered until more data arrives.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

/// NAL unit classification
///
/// Derived from the low 5 bits of the NAL header byte. Only the types the
/// pipeline dispatches on get their own variant; everything else is
/// `Other` and is discarded by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluKind {
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// IDR slice (keyframe)
    Idr,
    /// Non-IDR slice
    NonIdr,
    /// Any other NAL type (SEI, AUD, filler, ...)
    Other(u8),
}

impl NaluKind {
    /// Classify from the NAL header byte
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            7 => NaluKind::Sps,
            8 => NaluKind::Pps,
            5 => NaluKind::Idr,
            1 => NaluKind::NonIdr,
            t => NaluKind::Other(t),
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluKind::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluKind::Sps | NaluKind::Pps)
    }

    /// True for coded slices that are fed to the decoder
    pub fn is_slice(&self) -> bool {
        matches!(self, NaluKind::Idr | NaluKind::NonIdr)
    }
}

/// A complete NAL unit, start code stripped
#[derive(Debug, Clone)]
pub struct NalUnit {
    pub kind: NaluKind,
    /// Payload including the one-byte NAL header
    pub data: Bytes,
}

/// Incremental Annex-B demuxer
///
/// Feed arbitrary chunks with [`push`](Self::push), then drain complete
/// units with [`next_unit`](Self::next_unit). Bytes from the last seen
/// start code onward are always retained for the next push.
#[derive(Debug, Default)]
pub struct AnnexBDemuxer {
    buf: BytesMut,
    ready: VecDeque<NalUnit>,
}

impl AnnexBDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and scan for newly completed NAL units
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        self.scan();
    }

    /// Pop the next completed unit, in arrival order
    pub fn next_unit(&mut self) -> Option<NalUnit> {
        self.ready.pop_front()
    }

    /// Bytes currently held for an incomplete trailing unit
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard all accumulated state
    pub fn reset(&mut self) {
        self.buf.clear();
        self.ready.clear();
    }

    /// Locate every start code in the buffer, queue the units lying
    /// between consecutive codes, and drop everything before the last
    /// code. The unit after the last code is incomplete by definition
    /// and stays in the buffer.
    fn scan(&mut self) {
        let codes = find_start_codes(&self.buf);
        if codes.is_empty() {
            // No framing yet; wait for more data.
            return;
        }

        for pair in codes.windows(2) {
            let (offset, len) = pair[0];
            let end = pair[1].0;
            let start = offset + len;
            if start >= end {
                // Zero-length unit between adjacent start codes; nothing
                // to classify, skip it.
                continue;
            }
            let data = Bytes::copy_from_slice(&self.buf[start..end]);
            let kind = NaluKind::from_header(data[0]);
            tracing::trace!(kind = ?kind, len = data.len(), "NAL unit complete");
            self.ready.push_back(NalUnit { kind, data });
        }

        // Everything before the last start code has been consumed.
        let last = codes[codes.len() - 1].0;
        self.buf.advance(last);
    }
}

/// Find all Annex-B start codes as `(offset, code_len)` pairs.
///
/// The 4-byte form is preferred when both forms are structurally possible
/// at the same offset.
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut codes = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                codes.push((i, 4));
                i += 4;
                continue;
            }
            if data[i + 2] == 1 {
                codes.push((i, 3));
                i += 3;
                continue;
            }
        }
        i += 1;
    }
    codes
}
