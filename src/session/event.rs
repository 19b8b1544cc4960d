//! Session output contract
//!
//! The session talks to its host through exactly two channels of
//! information: frames and errors, delivered as [`StreamEvent`]s on the
//! receiver returned at construction. There is no global event bus.

use bytes::Bytes;

use crate::decode::DecodedFrame;

/// A displayable frame
#[derive(Debug, Clone)]
pub enum VideoFrame {
    /// A complete JPEG still from the MJPEG path (not decoded here; the
    /// renderer owns rasterization)
    Jpeg(Bytes),
    /// A decoded frame from the AVC path
    Decoded(DecodedFrame),
}

impl VideoFrame {
    pub fn len(&self) -> usize {
        match self {
            VideoFrame::Jpeg(data) => data.len(),
            VideoFrame::Decoded(frame) => frame.data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Events emitted by a stream session
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A new frame is ready to display
    Frame(VideoFrame),
    /// A recoverable or fatal error occurred; the session keeps running
    /// for recoverable ones
    Error(String),
    /// The underlying stream ended normally
    Ended,
}
