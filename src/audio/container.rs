//! # Container Encoding
//!
//! Wraps one message worth of samples into a complete, self-standing WAV
//! byte stream: RIFF header, `fmt ` chunk describing one channel at the
//! configured rate, and the `data` chunk. The RIFF layout itself is written
//! by the `wav` crate.
//!
//! ## Quantization (Int16):
//! Samples are clamped to [-1.0, 1.0]. Negative values scale by 32768,
//! non-negative values by 32767, and the result is truncated toward zero.
//! Decoding divides by the same factor, so a round trip is exact to within
//! `1 / 32767`.

use crate::config::{AudioConfig, SampleFormat};
use std::io::Cursor;

/// Every container carries exactly one channel.
pub const CHANNELS: u16 = 1;

/// Encodes sample buffers into WAV containers with a fixed layout.
#[derive(Debug, Clone, Copy)]
pub struct ContainerEncoder {
    sample_rate: u32,
    sample_format: SampleFormat,
}

/// A container parsed back into samples.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub samples: Vec<f32>,
}

impl ContainerEncoder {
    pub fn new(sample_rate: u32, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            sample_format,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.sample_rate, config.sample_format)
    }

    /// Build the container bytes for `samples`.
    // `wav` 1.x marks its whole API deprecated in favour of `hound`.
    #[allow(deprecated)]
    pub fn encode(&self, samples: &[f32]) -> std::io::Result<Vec<u8>> {
        let (audio_format, track) = match self.sample_format {
            SampleFormat::Int16 => (wav::WAV_FORMAT_PCM, wav::BitDepth::Sixteen(float_to_pcm(samples))),
            SampleFormat::Float32 => (
                wav::WAV_FORMAT_IEEE_FLOAT,
                wav::BitDepth::ThirtyTwoFloat(samples.to_vec()),
            ),
        };
        let header = wav::Header::new(
            audio_format,
            CHANNELS,
            self.sample_rate,
            self.sample_format.bits_per_sample(),
        );

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
        wav::write(header, &track, &mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Parse a single WAV container back into `f32` samples.
#[cfg(test)]
#[allow(deprecated)]
pub fn decode(bytes: &[u8]) -> std::io::Result<DecodedContainer> {
    let mut cursor = Cursor::new(bytes);
    let (header, track) = wav::read(&mut cursor)?;

    let (sample_format, samples) = match track {
        wav::BitDepth::Sixteen(pcm) => (SampleFormat::Int16, pcm_to_float(&pcm)),
        wav::BitDepth::ThirtyTwoFloat(samples) => (SampleFormat::Float32, samples),
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "unsupported container encoding: format {} with {} bits per sample",
                    header.audio_format, header.bits_per_sample
                ),
            ))
        }
    };

    Ok(DecodedContainer {
        sample_rate: header.sampling_rate,
        channels: header.channel_count,
        sample_format,
        samples,
    })
}

/// Quantize float samples to 16-bit PCM.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            if clamped < 0.0 {
                (clamped * 32768.0) as i16
            } else {
                (clamped * 32767.0) as i16
            }
        })
        .collect()
}

/// Inverse of [`float_to_pcm`].
#[cfg(test)]
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| {
            if sample < 0 {
                sample as f32 / 32768.0
            } else {
                sample as f32 / 32767.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::decode_f32le;

    const TOLERANCE: f32 = 1.0 / 32767.0;

    fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= tolerance, "{} vs {}", a, e);
        }
    }

    #[test]
    fn test_two_sample_container() {
        let encoder = ContainerEncoder::new(44_100, SampleFormat::Int16);
        let bytes = encoder.encode(&[0.5, -0.5]).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.sample_format, SampleFormat::Int16);
        assert_close(&decoded.samples, &[0.5, -0.5], TOLERANCE);
    }

    #[test]
    fn test_round_trip_from_payload() {
        let input: Vec<f32> = (0..2048)
            .map(|i| (i as f32 * 0.031).sin() * 0.8)
            .collect();
        let payload: Vec<u8> = input.iter().flat_map(|s| s.to_le_bytes()).collect();

        let samples = decode_f32le(&payload).unwrap();
        let bytes = ContainerEncoder::new(16_000, SampleFormat::Int16)
            .encode(&samples)
            .unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 16_000);
        assert_close(&decoded.samples, &input, TOLERANCE);
    }

    #[test]
    fn test_float32_round_trip_is_exact() {
        let input = vec![0.123_456_7, -0.987_654_3, 0.0, 1.0, -1.0];
        let bytes = ContainerEncoder::new(48_000, SampleFormat::Float32)
            .encode(&input)
            .unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.sample_format, SampleFormat::Float32);
        assert_eq!(decoded.samples, input);
    }

    #[test]
    fn test_quantization_clamps_out_of_range() {
        let pcm = float_to_pcm(&[1.5, -1.5, 1.0, -1.0, 0.0]);
        assert_eq!(pcm, vec![32767, -32768, 32767, -32768, 0]);

        let back = pcm_to_float(&pcm);
        assert_eq!(back, vec![1.0, -1.0, 1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"definitely not a wav file").is_err());
    }
}
