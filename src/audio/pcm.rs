//! # PCM Decoding
//!
//! Reinterprets an audio message as a tightly packed sequence of
//! little-endian `f32` samples. The whole buffer is one channel; nothing is
//! resampled or de-interleaved.

use crate::error::CaptureError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Width of one incoming sample in bytes.
pub const SAMPLE_WIDTH: usize = 4;

/// Decode a raw payload into samples.
///
/// ## Errors:
/// - Empty payload
/// - Length that is not a multiple of [`SAMPLE_WIDTH`]; a trailing partial
///   sample is never silently dropped
pub fn decode_f32le(data: &[u8]) -> Result<Vec<f32>, CaptureError> {
    if data.is_empty() {
        return Err(CaptureError::InvalidPayload(
            "No audio data provided".to_string(),
        ));
    }
    if data.len() % SAMPLE_WIDTH != 0 {
        return Err(CaptureError::InvalidPayload(format!(
            "{} bytes is not a whole number of {}-byte float samples",
            data.len(),
            SAMPLE_WIDTH
        )));
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / SAMPLE_WIDTH);
    while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
        samples.push(sample);
    }

    Ok(samples)
}
