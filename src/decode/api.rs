//! Capability-abstracted video decoder boundary
//!
//! The pipeline never talks to a concrete decoder; hosts supply a
//! [`DecoderFactory`] that creates [`VideoDecoder`] instances wired to a
//! pair of asynchronous callbacks. `decode` is fire-and-forget: decoded
//! frames arrive on `on_frame`, failures discovered after submission on
//! `on_error`.

use bytes::Bytes;

use crate::error::{DecoderError, Result};

/// Decoder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Created but not yet configured
    Unconfigured,
    /// `configure` succeeded, ready for samples
    Configured,
    /// Closed; the instance must be replaced, not reused
    Closed,
}

/// Out-of-band decoder configuration
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Codec identifier string, e.g. `avc1.42001f`
    pub codec: String,
    /// Coded width in pixels; 0 lets the decoder infer from the bitstream
    pub coded_width: u32,
    /// Coded height in pixels; 0 lets the decoder infer from the bitstream
    pub coded_height: u32,
    /// avcC configuration record (SPS/PPS and length-prefix size)
    pub description: Bytes,
    /// Hint the decoder to minimize queueing latency
    pub optimize_for_latency: bool,
}

/// A single encoded sample in AVCC form
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Synthetic presentation timestamp in microseconds
    pub timestamp_us: u64,
    /// True for IDR samples
    pub keyframe: bool,
    /// Length-prefixed NAL unit data
    pub data: Bytes,
}

/// A decoded video frame, delivered on the `on_frame` callback
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Presentation timestamp carried over from the submitted chunk
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    /// Pixel data in the decoder's native layout
    pub data: Bytes,
}

/// Asynchronous output callbacks handed to the decoder at creation
pub struct DecoderCallbacks {
    pub on_frame: Box<dyn Fn(DecodedFrame) + Send + Sync>,
    pub on_error: Box<dyn Fn(DecoderError) + Send + Sync>,
}

impl std::fmt::Debug for DecoderCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderCallbacks").finish_non_exhaustive()
    }
}

/// One underlying hardware/software decoder instance
pub trait VideoDecoder: Send {
    /// Configure with codec string and out-of-band description.
    /// Transitions to `Configured` on success.
    fn configure(&mut self, config: &DecoderConfig) -> Result<()>;

    /// Submit one sample. Returns as soon as the sample is queued; the
    /// decoded frame arrives on the `on_frame` callback.
    fn decode(&mut self, chunk: EncodedChunk) -> Result<()>;

    /// Close the instance. Idempotent.
    fn close(&mut self);

    fn state(&self) -> DecoderState;

    /// Samples submitted but not yet emitted, as a backpressure signal
    fn queue_depth(&self) -> usize {
        0
    }
}

/// Creates fresh decoder instances.
///
/// A new instance is requested at stream start and whenever the previous
/// one was closed after an error; instances are never reconfigured in
/// place after a failure.
pub trait DecoderFactory: Send + Sync {
    fn create(&self, callbacks: DecoderCallbacks) -> Result<Box<dyn VideoDecoder>>;
}
