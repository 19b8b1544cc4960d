//! AVC decoder configuration record (avcC) construction
//!
//! Decoder APIs take out-of-band configuration as an ISO/IEC 14496-15
//! AVCDecoderConfigurationRecord and expect samples in AVCC form
//! (length-prefixed NAL units) matching the declared length size.
//!
//! Record layout as built here (one SPS, one PPS):
//! ```text
//! configurationVersion (1) = 0x01
//! AVCProfileIndication (1) | profile_compatibility (1) | AVCLevelIndication (1)
//!   (copied from SPS bytes 1..4)
//! lengthSizeMinusOne (1) = 0xFF  (reserved bits set, 4-byte lengths)
//! numOfSPS (1) = 0xE1            (reserved bits set, 1 SPS)
//! spsLength (2, BE) | SPS bytes
//! numOfPPS (1) = 0x01
//! ppsLength (2, BE) | PPS bytes
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// Length-prefix size declared by `lengthSizeMinusOne = 0xFF`
pub const NALU_LENGTH_SIZE: usize = 4;

/// Build an avcC record from one SPS and one PPS NAL unit (headers
/// included, start codes stripped).
pub fn build_record(sps: &[u8], pps: &[u8]) -> Result<Bytes> {
    if sps.len() < 4 {
        return Err(MediaError::TruncatedSps(sps.len()).into());
    }
    if pps.is_empty() {
        return Err(MediaError::EmptyNalu.into());
    }
    if sps.len() > u16::MAX as usize {
        return Err(MediaError::ParameterSetTooLarge(sps.len()).into());
    }
    if pps.len() > u16::MAX as usize {
        return Err(MediaError::ParameterSetTooLarge(pps.len()).into());
    }

    let mut out = BytesMut::with_capacity(11 + sps.len() + pps.len());
    out.put_u8(0x01); // configurationVersion
    out.put_u8(sps[1]); // AVCProfileIndication
    out.put_u8(sps[2]); // profile_compatibility
    out.put_u8(sps[3]); // AVCLevelIndication
    out.put_u8(0xFF); // lengthSizeMinusOne = 3, reserved bits set
    out.put_u8(0xE1); // numOfSequenceParameterSets = 1, reserved bits set
    out.put_u16(sps.len() as u16);
    out.put_slice(sps);
    out.put_u8(0x01); // numOfPictureParameterSets
    out.put_u16(pps.len() as u16);
    out.put_slice(pps);
    Ok(out.freeze())
}

/// Codec identifier string for `configure`, e.g. `avc1.42001f`.
///
/// The six hex digits are the SPS profile/compatibility/level bytes.
pub fn codec_string(sps: &[u8]) -> Result<String> {
    if sps.len() < 4 {
        return Err(MediaError::TruncatedSps(sps.len()).into());
    }
    Ok(format!("avc1.{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
}

/// AVC profile indication from the SPS, for diagnostics
pub fn profile_name(sps: &[u8]) -> &'static str {
    match sps.get(1) {
        Some(66) => "Baseline",
        Some(77) => "Main",
        Some(88) => "Extended",
        Some(100) => "High",
        Some(110) => "High 10",
        Some(122) => "High 4:2:2",
        Some(244) => "High 4:4:4",
        _ => "Unknown",
    }
}

/// True when the SPS carries a profile indication the decode pipeline
/// knows how to configure. Scalable and multiview profiles are not.
pub fn is_supported_profile(sps: &[u8]) -> bool {
    matches!(sps.get(1), Some(66 | 77 | 88 | 100 | 110 | 122 | 244))
}

/// Convert a single Annex-B NAL payload (start code already stripped) to
/// AVCC form by prepending a 4-byte big-endian length.
///
/// Must match [`NALU_LENGTH_SIZE`] or the decoder rejects the sample.
pub fn length_prefixed(nalu: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(NALU_LENGTH_SIZE + nalu.len());
    out.put_u32(nalu.len() as u32);
    out.put_slice(nalu);
    out.freeze()
}
