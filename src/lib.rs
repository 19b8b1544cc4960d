//! mirror-stream: device-mirroring video stream pipeline
//!
//! This library is the streaming core of a device-mirroring client: it
//! demuxes a live, unbounded byte stream from a phone or emulator
//! carrying either MJPEG multipart frames or a raw H.264 Annex-B
//! elementary stream, and drives a host-supplied video decoder with
//! correctly framed, correctly timestamped samples.
//!
//! - MJPEG parts are sliced out by boundary marker and `Content-Length`
//!   and emitted as ready-to-display JPEG stills.
//! - H.264 NAL units are reassembled across arbitrary chunk boundaries,
//!   SPS/PPS drive decoder configuration (avcC), and coded slices are
//!   fed in AVCC form with synthetic fixed-rate timestamps.
//!
//! Rendering, authentication, and the device-control RPC channel are the
//! host's concern; the session only consumes the byte stream handed to
//! it and emits frames and errors.
//!
//! # Example: MJPEG session
//!
//! ```no_run
//! use mirror_stream::{ChannelSource, SessionConfig, StreamEvent, StreamSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // `tx` is fed from e.g. a chunked HTTP response body.
//!     let (tx, source) = ChannelSource::pair(32);
//!     let _ = tx;
//!
//!     let (session, mut events) = StreamSession::new(
//!         SessionConfig::mjpeg("BoundaryString"),
//!         Box::new(source),
//!         None,
//!     )?;
//!     session.start()?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             StreamEvent::Frame(frame) => println!("frame: {} bytes", frame.len()),
//!             StreamEvent::Error(e) => eprintln!("stream error: {}", e),
//!             StreamEvent::Ended => break,
//!         }
//!     }
//!     session.stop();
//!     Ok(())
//! }
//! ```

pub mod decode;
pub mod error;
pub mod media;
pub mod session;
pub mod source;
pub mod stats;

// Re-export main types for convenience
pub use decode::{
    DecodedFrame, DecoderCallbacks, DecoderConfig, DecoderFactory, DecoderState, EncodedChunk,
    VideoDecoder,
};
pub use error::{DecoderError, Error, MediaError, Result};
pub use media::{boundary_from_content_type, AnnexBDemuxer, MjpegDemuxer, NalUnit, NaluKind};
pub use session::{SessionConfig, SessionState, StreamEvent, StreamFormat, StreamSession, VideoFrame};
pub use source::{ChannelSource, ChunkSource, IoSource};
pub use stats::StreamStats;
