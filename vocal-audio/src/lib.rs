pub mod backend;
pub mod capture;
pub mod codec;
pub mod config;
pub mod device;
mod dsp;
pub mod error;
pub mod frame;
pub mod playback;
pub mod resampler;
pub mod session;

pub use cpal;
pub use device::{Device, DeviceType};
pub use error::{AudioError, FormatError};
pub use frame::SampleFrame;

/// Raw 16-bit little-endian PCM, mono, at [`WIRE_SAMPLE_RATE`]. No header.
pub type EncodedChunk = bytes::Bytes;

/// Fixed sample rate audio is transported at, in both directions.
pub const WIRE_SAMPLE_RATE: u32 = 24_000;
/// Minimum number of output samples the resampler produces per batch.
pub const MIN_OUTPUT_FRAME: usize = 128;
