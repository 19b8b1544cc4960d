//! Session configuration

/// Which container the device stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// multipart/x-mixed-replace with JPEG parts
    Mjpeg,
    /// Raw H.264 Annex-B elementary stream
    Avc,
}

/// Stream session configuration options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stream container format
    pub format: StreamFormat,

    /// Multipart boundary token, without the leading dashes
    pub boundary: String,

    /// Coded width hint for the decoder; 0 = infer from bitstream
    pub coded_width: u32,

    /// Coded height hint for the decoder; 0 = infer from bitstream
    pub coded_height: u32,

    /// Synthetic presentation timestamp step in microseconds.
    ///
    /// The device protocol carries no timestamps, so frames are stamped
    /// at an assumed fixed rate (default 60 fps). Deliberately not
    /// inferred from observed arrival timing.
    pub frame_interval_us: u64,

    /// Capacity of the outbound event channel
    pub event_capacity: usize,

    /// Scratch buffer size for `IoSource` readers
    pub read_scratch_size: usize,

    /// Whether the host environment actually has a video decoder.
    ///
    /// When false the AVC path still demuxes (and the session reports
    /// stats) but never creates or feeds a decoder.
    pub decoder_available: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format: StreamFormat::Avc,
            boundary: "BoundaryString".to_string(),
            coded_width: 0,
            coded_height: 0,
            frame_interval_us: 16_666, // 60 fps
            event_capacity: 64,
            read_scratch_size: 64 * 1024,
            decoder_available: true,
        }
    }
}

impl SessionConfig {
    /// Config for an Annex-B H.264 stream
    pub fn avc() -> Self {
        Self::default()
    }

    /// Config for an MJPEG multipart stream with the given boundary token
    pub fn mjpeg(boundary: &str) -> Self {
        Self {
            format: StreamFormat::Mjpeg,
            boundary: boundary.to_string(),
            ..Default::default()
        }
    }

    /// Set the decoder size hint
    pub fn coded_size(mut self, width: u32, height: u32) -> Self {
        self.coded_width = width;
        self.coded_height = height;
        self
    }

    /// Set the synthetic timestamp step
    pub fn frame_interval_us(mut self, interval: u64) -> Self {
        self.frame_interval_us = interval;
        self
    }

    /// Set the outbound event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Mark the host as having no decoder capability
    pub fn without_decoder(mut self) -> Self {
        self.decoder_available = false;
        self
    }
}
