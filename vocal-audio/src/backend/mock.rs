use crate::DeviceType;
use crate::backend::{
    AudioBackend, AudioStream, ErrorCallback, InputCallback, OutputCallback, StreamControl,
    StreamFormat,
};
use crate::error::{AudioError, DeviceFailureReason};
use parking_lot::Mutex;
use std::sync::Arc;

struct OpenStream<C> {
    id: u64,
    on_data: C,
    on_error: ErrorCallback,
    playing: bool,
}

struct MockState {
    input_format: StreamFormat,
    output_format: StreamFormat,
    input_available: bool,
    output_available: bool,
    next_id: u64,
    input: Option<OpenStream<InputCallback>>,
    output: Option<OpenStream<OutputCallback>>,
}

/// Backend whose callbacks are invoked through the paired [`MockHandle`].
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

/// Test-side control over a [`MockBackend`], playing the role of the audio hardware.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

#[tracing::instrument(level = "debug")]
pub fn create(input_format: StreamFormat, output_format: StreamFormat) -> (MockBackend, MockHandle) {
    let state = Arc::new(Mutex::new(MockState {
        input_format,
        output_format,
        input_available: true,
        output_available: true,
        next_id: 0,
        input: None,
        output: None,
    }));

    (
        MockBackend {
            state: state.clone(),
        },
        MockHandle { state },
    )
}

impl AudioBackend for MockBackend {
    fn open_input<F>(&self, build: F, on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> InputCallback,
    {
        let mut state = self.state.lock();
        if !state.input_available {
            return Err(DeviceFailureReason::Unavailable(
                DeviceType::Input,
                "mock input unavailable".to_string(),
            )
            .into());
        }

        state.next_id += 1;
        let id = state.next_id;
        let on_data = build(state.input_format);
        state.input = Some(OpenStream {
            id,
            on_data,
            on_error,
            playing: true,
        });
        tracing::debug!(id, "Opened mock input stream");

        Ok(AudioStream::new(
            state.input_format,
            MockStream {
                id,
                device_type: DeviceType::Input,
                state: self.state.clone(),
            },
        ))
    }

    fn open_output<F>(&self, build: F, on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> OutputCallback,
    {
        let mut state = self.state.lock();
        if !state.output_available {
            return Err(DeviceFailureReason::Unavailable(
                DeviceType::Output,
                "mock output unavailable".to_string(),
            )
            .into());
        }

        state.next_id += 1;
        let id = state.next_id;
        let on_data = build(state.output_format);
        state.output = Some(OpenStream {
            id,
            on_data,
            on_error,
            playing: true,
        });
        tracing::debug!(id, "Opened mock output stream");

        Ok(AudioStream::new(
            state.output_format,
            MockStream {
                id,
                device_type: DeviceType::Output,
                state: self.state.clone(),
            },
        ))
    }
}

impl MockHandle {
    pub fn set_input_available(&self, available: bool) {
        self.state.lock().input_available = available;
    }

    pub fn set_output_available(&self, available: bool) {
        self.state.lock().output_available = available;
    }

    pub fn input_open(&self) -> bool {
        self.state.lock().input.is_some()
    }

    pub fn output_open(&self) -> bool {
        self.state.lock().output.is_some()
    }

    pub fn output_playing(&self) -> bool {
        self.state.lock().output.as_ref().is_some_and(|s| s.playing)
    }

    /// Delivers one interleaved input block. Returns `false` if no running input stream exists.
    pub fn push_input(&self, interleaved: &[f32]) -> bool {
        let mut state = self.state.lock();
        match state.input.as_mut() {
            Some(stream) if stream.playing => {
                (stream.on_data)(interleaved);
                true
            }
            _ => false,
        }
    }

    /// Runs one render tick into `output`. Returns `false` if no running output stream exists,
    /// in which case `output` is left untouched.
    pub fn render(&self, output: &mut [f32]) -> bool {
        let mut state = self.state.lock();
        match state.output.as_mut() {
            Some(stream) if stream.playing => {
                (stream.on_data)(output);
                true
            }
            _ => false,
        }
    }

    /// Simulates the device failing mid-stream.
    pub fn fail(&self, device_type: DeviceType, message: &str) {
        let err = AudioError::Device(DeviceFailureReason::Stream(device_type, message.to_string()));
        let mut state = self.state.lock();
        let on_error = match device_type {
            DeviceType::Input => state.input.as_mut().map(|s| &mut s.on_error),
            DeviceType::Output => state.output.as_mut().map(|s| &mut s.on_error),
        };
        if let Some(on_error) = on_error {
            on_error(err);
        }
    }
}

struct MockStream {
    id: u64,
    device_type: DeviceType,
    state: Arc<Mutex<MockState>>,
}

impl MockStream {
    fn set_playing(&self, playing: bool) {
        let mut state = self.state.lock();
        let stream_playing = match self.device_type {
            DeviceType::Input => state
                .input
                .as_mut()
                .filter(|s| s.id == self.id)
                .map(|s| &mut s.playing),
            DeviceType::Output => state
                .output
                .as_mut()
                .filter(|s| s.id == self.id)
                .map(|s| &mut s.playing),
        };
        if let Some(stream_playing) = stream_playing {
            *stream_playing = playing;
        }
    }
}

impl StreamControl for MockStream {
    fn play(&self) -> Result<(), AudioError> {
        self.set_playing(true);
        Ok(())
    }

    fn pause(&self) -> Result<(), AudioError> {
        self.set_playing(false);
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        match self.device_type {
            DeviceType::Input if state.input.as_ref().is_some_and(|s| s.id == self.id) => {
                state.input = None;
            }
            DeviceType::Output if state.output.as_ref().is_some_and(|s| s.id == self.id) => {
                state.output = None;
            }
            _ => {}
        }
        tracing::debug!(id = self.id, device_type = %self.device_type, "Closed mock stream");
    }
}
