//! Seam between the pipelines and the platform's audio devices.
//!
//! Real devices are driven through [`system::SystemBackend`]; [`mock`] lets tests invoke the
//! input and render callbacks by hand.

pub mod mock;
pub mod system;

use crate::error::AudioError;
use std::fmt::{Debug, Formatter};
use tokio::sync::mpsc;

/// Receives interleaved input samples, invoked from the device's real-time thread.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;
/// Fills an interleaved output block, invoked from the device's real-time thread.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;
/// Invoked when a running stream fails, e.g. because its device was unplugged.
pub type ErrorCallback = Box<dyn FnMut(AudioError) + Send + 'static>;

/// Channel on which streams report failures that happen after they were opened.
pub type FaultSender = mpsc::UnboundedSender<AudioError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

pub trait StreamControl {
    fn play(&self) -> Result<(), AudioError>;
    fn pause(&self) -> Result<(), AudioError>;
}

/// An open device stream. Dropping it releases the device and its callbacks.
pub struct AudioStream {
    format: StreamFormat,
    control: Box<dyn StreamControl>,
}

impl AudioStream {
    pub fn new(format: StreamFormat, control: impl StreamControl + 'static) -> Self {
        Self {
            format,
            control: Box::new(control),
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn play(&self) -> Result<(), AudioError> {
        self.control.play()
    }

    pub fn pause(&self) -> Result<(), AudioError> {
        self.control.pause()
    }
}

impl Debug for AudioStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Opens device streams. Returned streams are already running.
///
/// The data callback is built from the negotiated [`StreamFormat`] before the stream starts,
/// so it never observes a format it was not set up for.
pub trait AudioBackend {
    fn open_input<F>(&self, build: F, on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> InputCallback;

    fn open_output<F>(&self, build: F, on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> OutputCallback;
}

impl<B: AudioBackend> AudioBackend for std::sync::Arc<B> {
    fn open_input<F>(&self, build: F, on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> InputCallback,
    {
        (**self).open_input(build, on_error)
    }

    fn open_output<F>(&self, build: F, on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> OutputCallback,
    {
        (**self).open_output(build, on_error)
    }
}

/// Builds an error callback that logs the failure and forwards it to `faults`, if any.
pub(crate) fn fault_reporter(faults: Option<FaultSender>, stream: &'static str) -> ErrorCallback {
    Box::new(move |err: AudioError| {
        tracing::error!(?err, stream, "Audio stream failed");
        if let Some(faults) = &faults {
            // The receiver may already be gone during shutdown.
            let _ = faults.send(err);
        }
    })
}
