//! Unified error types for mirror-stream

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all stream-pipeline operations
#[derive(Debug)]
pub enum Error {
    /// I/O error while reading the underlying byte stream
    Io(io::Error),
    /// Media parsing error
    Media(MediaError),
    /// Decoder configure/decode failure
    Decoder(DecoderError),
    /// The read was cancelled by `stop()`
    Cancelled,
    /// Invalid configuration
    Config(String),
    /// Session is not in a state that allows the operation
    InvalidState(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::Decoder(e) => write!(f, "Decoder error: {}", e),
            Error::Cancelled => write!(f, "Read cancelled"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid session state: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<MediaError> for Error {
    fn from(err: MediaError) -> Self {
        Error::Media(err)
    }
}

impl From<DecoderError> for Error {
    fn from(err: DecoderError) -> Self {
        Error::Decoder(err)
    }
}

impl Error {
    /// True if this error is the expected result of `stop()` cancelling a
    /// pending read. Such errors are swallowed by the read loop.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Media parsing errors
#[derive(Debug)]
pub enum MediaError {
    /// NAL unit shorter than its one-byte header
    EmptyNalu,
    /// Multipart headers present but not terminated before the buffer cap
    HeaderTooLarge(usize),
    /// SPS too short to carry profile/compat/level bytes
    TruncatedSps(usize),
    /// Parameter set exceeds the 16-bit length field of the avcC record
    ParameterSetTooLarge(usize),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::EmptyNalu => write!(f, "Empty NAL unit"),
            MediaError::HeaderTooLarge(n) => {
                write!(f, "Multipart header block exceeds {} bytes", n)
            }
            MediaError::TruncatedSps(n) => write!(f, "SPS too short: {} bytes", n),
            MediaError::ParameterSetTooLarge(n) => {
                write!(f, "Parameter set too large for avcC: {} bytes", n)
            }
        }
    }
}

impl std::error::Error for MediaError {}

/// Decoder-boundary errors
#[derive(Debug)]
pub enum DecoderError {
    /// The host reported no decoder capability
    Unavailable,
    /// `configure` rejected the codec string or description
    InvalidConfig(String),
    /// The profile encoded in the SPS is not supported by the decoder
    UnsupportedProfile(u8),
    /// `decode` rejected a submitted chunk
    DecodeFailed(String),
    /// The decoder instance is closed
    Closed,
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderError::Unavailable => write!(f, "No video decoder available"),
            DecoderError::InvalidConfig(msg) => write!(f, "Invalid decoder config: {}", msg),
            DecoderError::UnsupportedProfile(p) => write!(f, "Unsupported AVC profile: {}", p),
            DecoderError::DecodeFailed(msg) => write!(f, "Decode failed: {}", msg),
            DecoderError::Closed => write!(f, "Decoder is closed"),
        }
    }
}

impl std::error::Error for DecoderError {}
