//! # Audio Handling
//!
//! Turns the raw bytes of an audio message into a playable container.
//!
//! ## Key Components:
//! - **PCM decoding** (`pcm`): binary payload → `f32` samples
//! - **Container encoding** (`container`): samples → complete WAV byte stream
//!
//! ## Audio Format:
//! - **Incoming**: IEEE-754 32-bit floats, little-endian, mono
//! - **Outgoing**: mono WAV at the configured sample rate, 16-bit PCM or 32-bit float

pub mod container;
pub mod pcm;
