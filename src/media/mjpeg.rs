//! MJPEG multipart/x-mixed-replace demuxing
//!
//! Virtual devices stream screen captures as an endless multipart HTTP
//! body: one JPEG per part.
//!
//! ```text
//! --BoundaryString\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: 1234\r\n
//! \r\n
//! <1234 bytes of JPEG data>
//! --BoundaryString\r\n
//! ...
//! ```
//!
//! `Content-Length` is authoritative for the payload size, so the payload
//! may legally contain the boundary bytes. Chunk boundaries are arbitrary;
//! a part may arrive split anywhere, including inside its JPEG data.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::MediaError;

/// Cap on the header block between a boundary and its blank-line
/// terminator. A part exceeding this is malformed and gets skipped.
const MAX_HEADER_BYTES: usize = 16 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Per-part parser state
#[derive(Debug)]
enum PartState {
    /// Looking for the next boundary and its header block
    SeekHeader,
    /// Accumulating exactly `remaining` more payload bytes
    Body { remaining: usize, payload: BytesMut },
}

/// Incremental multipart MJPEG demuxer
///
/// Feed arbitrary chunks with [`push`](Self::push), then drain complete
/// JPEG payloads with [`next_frame`](Self::next_frame).
#[derive(Debug)]
pub struct MjpegDemuxer {
    /// Boundary marker including the leading dashes
    boundary: Vec<u8>,
    buf: BytesMut,
    state: PartState,
}

impl MjpegDemuxer {
    /// Create a demuxer for the given boundary token (without the leading
    /// `--`).
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: format!("--{}", boundary).into_bytes(),
            buf: BytesMut::new(),
            state: PartState::SeekHeader,
        }
    }

    /// Append a chunk of the multipart body
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered for the part currently being parsed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard all accumulated state
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = PartState::SeekHeader;
    }

    /// Try to extract one complete JPEG payload.
    ///
    /// Returns `None` when more data is needed; call again after the next
    /// [`push`](Self::push). A part with a missing or unparseable
    /// `Content-Length` is consumed silently and never emitted.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            match &mut self.state {
                PartState::SeekHeader => {
                    if !self.seek_header()? {
                        continue;
                    }
                }
                PartState::Body { remaining, payload } => {
                    let take = (*remaining).min(self.buf.len());
                    payload.extend_from_slice(&self.buf[..take]);
                    self.buf.advance(take);
                    *remaining -= take;
                    if *remaining > 0 {
                        return None;
                    }
                    let frame = std::mem::take(payload).freeze();
                    self.state = PartState::SeekHeader;
                    tracing::trace!(len = frame.len(), "MJPEG frame complete");
                    return Some(frame);
                }
            }
        }
    }

    /// Locate the next boundary and consume its header block.
    ///
    /// `None` means more data is needed. `Some(true)` means the state
    /// moved to `Body`; `Some(false)` means a zero-length part was
    /// consumed and the caller should keep scanning.
    fn seek_header(&mut self) -> Option<bool> {
        let bpos = match find(&self.buf, &self.boundary) {
            Some(p) => p,
            None => {
                // Keep only a window that could still hold a partial
                // boundary marker.
                let keep = self.boundary.len().saturating_sub(1);
                if self.buf.len() > keep {
                    self.buf.advance(self.buf.len() - keep);
                }
                return None;
            }
        };

        let header_start = bpos + self.boundary.len();
        let sep = match find(&self.buf[header_start..], HEADER_TERMINATOR) {
            Some(p) => header_start + p,
            None => {
                if self.buf.len() - header_start > MAX_HEADER_BYTES {
                    // Unterminated header block; drop this boundary and
                    // rescan from the byte after it.
                    tracing::warn!(
                        error = %MediaError::HeaderTooLarge(MAX_HEADER_BYTES),
                        "skipping malformed multipart part"
                    );
                    self.buf.advance(header_start);
                    return Some(false);
                }
                // Headers incomplete, wait for more data.
                if bpos > 0 {
                    self.buf.advance(bpos);
                }
                return None;
            }
        };

        let content_length = parse_content_length(&self.buf[header_start..sep]);
        self.buf.advance(sep + HEADER_TERMINATOR.len());

        if content_length == 0 {
            // Missing or unparseable Content-Length: nothing to emit for
            // this part, keep scanning.
            tracing::debug!("multipart part without Content-Length, discarded");
            return Some(false);
        }

        self.state = PartState::Body {
            remaining: content_length,
            payload: BytesMut::with_capacity(content_length),
        };
        Some(true)
    }
}

/// Parse a case-insensitive `Content-Length` header out of a raw header
/// block. Missing or unparseable yields 0.
fn parse_content_length(headers: &[u8]) -> usize {
    let text = String::from_utf8_lossy(headers);
    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            return value.trim().parse().unwrap_or(0);
        }
    }
    0
}

/// Extract the boundary token from a `multipart/x-mixed-replace`
/// Content-Type header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    for param in content_type.split(';').skip(1) {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            return Some(value.trim().trim_matches('"').to_string());
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
