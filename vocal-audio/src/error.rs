use crate::DeviceType;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AudioError {
    /// Input or output device unavailable, rejected or revoked. Fatal to the current session.
    #[error("Device error: {0}")]
    Device(#[from] DeviceFailureReason),
    /// Malformed chunk or transport text. The offending chunk is dropped.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    /// Declared wire rate differs from the configured one. Operation continues at the known rate.
    #[error("Sample rate mismatch: declared {declared} Hz, expected {expected} Hz")]
    RateMismatch { declared: u32, expected: u32 },
}

#[derive(Debug, Clone, Error)]
pub enum DeviceFailureReason {
    #[error("{0} device unavailable: {1}")]
    Unavailable(DeviceType, String),
    #[error("failed to build {0} stream: {1}")]
    Build(DeviceType, String),
    #[error("failed to control {0} stream: {1}")]
    Control(DeviceType, String),
    #[error("{0} stream failed: {1}")]
    Stream(DeviceType, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("PCM16 payload has odd length {0}")]
    OddLength(usize),
    #[error("invalid transport text: {0}")]
    TransportText(String),
}
