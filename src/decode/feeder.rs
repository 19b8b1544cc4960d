//! Decoder configuration and sample feeding
//!
//! [`FrameFeeder`] owns the decoder instance plus the held SPS/PPS and
//! sits between the Annex-B demuxer and the decoder: parameter sets
//! update the configuration, coded slices get converted to AVCC form,
//! stamped with a synthetic timestamp, and submitted.
//!
//! Decoder failures never escape into the read loop. A configure or
//! decode error clears the configured flag, surfaces the error on the
//! host callback, and leaves the session parsing; the next SPS/PPS pair
//! replaces the dead instance with a fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DecoderError;
use crate::media::annexb::{NalUnit, NaluKind};
use crate::media::avcc;

use super::api::{
    DecoderCallbacks, DecoderConfig, DecoderFactory, DecoderState, EncodedChunk, VideoDecoder,
};

/// Host-facing callbacks the feeder forwards decoder output to
pub type FrameCallback = Arc<dyn Fn(super::api::DecodedFrame) + Send + Sync>;
/// Host-facing decoder error callback
pub type ErrorCallback = Arc<dyn Fn(DecoderError) + Send + Sync>;

/// Feeds classified NAL units to a decoder, creating and configuring
/// instances as parameter sets arrive.
pub struct FrameFeeder {
    /// Absent when the host reported no decoder capability
    factory: Option<Arc<dyn DecoderFactory>>,
    decoder: Option<Box<dyn VideoDecoder>>,
    /// Shared with the decoder's error callback, which clears it when a
    /// failure is reported asynchronously
    configured: Arc<AtomicBool>,
    /// Instance had an error and must be replaced at next configure.
    /// Shared with the error callback so asynchronous failures also
    /// poison the instance.
    poisoned: Arc<AtomicBool>,
    sps: Option<bytes::Bytes>,
    pps: Option<bytes::Bytes>,
    frame_index: u64,
    frame_interval_us: u64,
    coded_width: u32,
    coded_height: u32,
    on_frame: FrameCallback,
    on_error: ErrorCallback,
}

impl FrameFeeder {
    pub fn new(
        factory: Option<Arc<dyn DecoderFactory>>,
        frame_interval_us: u64,
        coded_width: u32,
        coded_height: u32,
        on_frame: FrameCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            factory,
            decoder: None,
            configured: Arc::new(AtomicBool::new(false)),
            poisoned: Arc::new(AtomicBool::new(false)),
            sps: None,
            pps: None,
            frame_index: 0,
            frame_interval_us,
            coded_width,
            coded_height,
            on_frame,
            on_error,
        }
    }

    /// Dispatch one demuxed NAL unit.
    ///
    /// SPS/PPS update the held parameter sets and trigger configuration
    /// once both are present; IDR and non-IDR slices are fed; everything
    /// else is discarded.
    pub fn handle_unit(&mut self, unit: &NalUnit) {
        match unit.kind {
            NaluKind::Sps => {
                self.sps = Some(unit.data.clone());
                self.maybe_configure();
            }
            NaluKind::Pps => {
                self.pps = Some(unit.data.clone());
                self.maybe_configure();
            }
            NaluKind::Idr | NaluKind::NonIdr => self.feed(unit),
            NaluKind::Other(t) => {
                tracing::trace!(nal_type = t, "discarding unhandled NAL unit");
            }
        }
    }

    /// True once the current decoder instance accepted a configuration
    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Frames successfully submitted to the decoder so far
    pub fn frames_submitted(&self) -> u64 {
        self.frame_index
    }

    /// Close the decoder and drop all held state. Safe to call twice.
    pub fn reset(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
        self.configured.store(false, Ordering::Release);
        self.poisoned.store(false, Ordering::Release);
        self.sps = None;
        self.pps = None;
        self.frame_index = 0;
    }

    /// Configure if both parameter sets are held and the current instance
    /// is not already configured.
    fn maybe_configure(&mut self) {
        if self.is_configured() {
            return;
        }
        let (Some(sps), Some(pps)) = (self.sps.clone(), self.pps.clone()) else {
            return;
        };
        let Some(factory) = self.factory.clone() else {
            tracing::trace!("no decoder capability, parsing without decode");
            return;
        };

        if let Err(e) = self.configure(&factory, &sps, &pps) {
            self.configured.store(false, Ordering::Release);
            tracing::warn!(error = %e, "decoder configuration failed");
            (self.on_error)(e);
        }
    }

    fn configure(
        &mut self,
        factory: &Arc<dyn DecoderFactory>,
        sps: &[u8],
        pps: &[u8],
    ) -> std::result::Result<(), DecoderError> {
        let codec = avcc::codec_string(sps).map_err(|e| DecoderError::InvalidConfig(e.to_string()))?;
        if !avcc::is_supported_profile(sps) {
            return Err(DecoderError::UnsupportedProfile(sps[1]));
        }
        let description =
            avcc::build_record(sps, pps).map_err(|e| DecoderError::InvalidConfig(e.to_string()))?;

        // A closed or errored instance is replaced, never reconfigured.
        let needs_new = match &self.decoder {
            None => true,
            Some(d) => self.poisoned.load(Ordering::Acquire) || d.state() == DecoderState::Closed,
        };
        if needs_new {
            if let Some(mut old) = self.decoder.take() {
                old.close();
            }
            let decoder = factory
                .create(self.make_callbacks())
                .map_err(|e| DecoderError::InvalidConfig(e.to_string()))?;
            self.decoder = Some(decoder);
            self.poisoned.store(false, Ordering::Release);
        }

        let config = DecoderConfig {
            codec: codec.clone(),
            coded_width: self.coded_width,
            coded_height: self.coded_height,
            description,
            optimize_for_latency: true,
        };

        let decoder = self.decoder.as_mut().ok_or(DecoderError::Unavailable)?;
        match decoder.configure(&config) {
            Ok(()) => {
                self.configured.store(true, Ordering::Release);
                tracing::debug!(
                    codec = %codec,
                    profile = avcc::profile_name(sps),
                    "decoder configured"
                );
                Ok(())
            }
            Err(e) => {
                self.poisoned.store(true, Ordering::Release);
                Err(DecoderError::InvalidConfig(e.to_string()))
            }
        }
    }

    /// Submit one coded slice if the decoder is ready; skip silently
    /// otherwise. Waiting for configuration is a normal transient
    /// condition, not a failure.
    fn feed(&mut self, unit: &NalUnit) {
        if !self.is_configured() {
            tracing::trace!("decoder not configured, skipping slice");
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            tracing::trace!("no decoder instance, skipping slice");
            return;
        };
        if decoder.state() != DecoderState::Configured {
            tracing::trace!("decoder not ready, skipping slice");
            return;
        }

        let chunk = EncodedChunk {
            timestamp_us: self.frame_index * self.frame_interval_us,
            keyframe: unit.kind.is_keyframe(),
            data: avcc::length_prefixed(&unit.data),
        };

        match decoder.decode(chunk) {
            Ok(()) => {
                // Only successful submissions advance the timestamp.
                self.frame_index += 1;
            }
            Err(e) => {
                self.configured.store(false, Ordering::Release);
                self.poisoned.store(true, Ordering::Release);
                let err = DecoderError::DecodeFailed(e.to_string());
                tracing::warn!(error = %err, "decode submission failed");
                (self.on_error)(err);
            }
        }
    }

    fn make_callbacks(&self) -> DecoderCallbacks {
        let on_frame = self.on_frame.clone();
        let on_error = self.on_error.clone();
        let configured = self.configured.clone();
        let poisoned = self.poisoned.clone();
        DecoderCallbacks {
            on_frame: Box::new(move |frame| on_frame(frame)),
            on_error: Box::new(move |err| {
                // An asynchronous decoder error gates further feeding and
                // poisons the instance so the next configure replaces it.
                configured.store(false, Ordering::Release);
                poisoned.store(true, Ordering::Release);
                on_error(err);
            }),
        }
    }
}

impl std::fmt::Debug for FrameFeeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameFeeder")
            .field("configured", &self.is_configured())
            .field("has_decoder", &self.decoder.is_some())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}
