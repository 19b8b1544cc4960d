//! Media demuxing for device mirroring
//!
//! This module provides:
//! - Annex-B H.264 elementary stream demuxing and NAL classification
//! - avcC decoder configuration record construction
//! - multipart/x-mixed-replace MJPEG demuxing

pub mod annexb;
pub mod avcc;
pub mod mjpeg;

pub use annexb::{AnnexBDemuxer, NalUnit, NaluKind};
pub use mjpeg::{boundary_from_content_type, MjpegDemuxer};
