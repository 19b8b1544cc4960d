//! Decoder boundary and sample feeding
//!
//! This module provides:
//! - The capability-abstracted [`VideoDecoder`]/[`DecoderFactory`] seam
//! - [`FrameFeeder`], which configures decoders from SPS/PPS and feeds
//!   AVCC samples with synthetic timestamps

pub mod api;
pub mod feeder;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{
    DecodedFrame, DecoderCallbacks, DecoderConfig, DecoderFactory, DecoderState, EncodedChunk,
    VideoDecoder,
};
pub use feeder::FrameFeeder;
