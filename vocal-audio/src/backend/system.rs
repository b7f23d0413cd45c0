use crate::backend::{
    AudioBackend, AudioStream, ErrorCallback, InputCallback, OutputCallback, StreamControl,
    StreamFormat,
};
use crate::config::{AudioConfig, AudioDeviceConfig};
use crate::error::{AudioError, DeviceFailureReason};
use crate::{Device, DeviceType};
use cpal::traits::{DeviceTrait, StreamTrait};
use tracing::instrument;

/// Backend opening real devices through cpal.
#[derive(Debug, Clone)]
pub struct SystemBackend {
    input: AudioDeviceConfig,
    output: AudioDeviceConfig,
}

impl SystemBackend {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            input: config.input.clone(),
            output: config.output.clone(),
        }
    }

    fn device(&self, device_type: DeviceType) -> Result<Device, AudioError> {
        let config = match device_type {
            DeviceType::Input => &self.input,
            DeviceType::Output => &self.output,
        };
        Device::new(config, device_type).map_err(|err| {
            DeviceFailureReason::Unavailable(device_type, format!("{err:#}")).into()
        })
    }
}

impl AudioBackend for SystemBackend {
    #[instrument(level = "debug", skip_all, err)]
    fn open_input<F>(&self, build: F, mut on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> InputCallback,
    {
        let device = self.device(DeviceType::Input)?;
        let format = StreamFormat::new(device.sample_rate(), device.channels());
        let mut on_data = build(format);

        let stream = device
            .device
            .build_input_stream(
                &device.stream_config.config(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| on_data(data),
                move |err: cpal::StreamError| {
                    on_error(DeviceFailureReason::Stream(DeviceType::Input, err.to_string()).into());
                },
                None,
            )
            .map_err(|err| DeviceFailureReason::Build(DeviceType::Input, err.to_string()))?;

        let stream = CpalStream {
            device_type: DeviceType::Input,
            stream,
        };
        stream.play()?;

        tracing::info!(%device, "Input stream running");
        Ok(AudioStream::new(format, stream))
    }

    #[instrument(level = "debug", skip_all, err)]
    fn open_output<F>(&self, build: F, mut on_error: ErrorCallback) -> Result<AudioStream, AudioError>
    where
        F: FnOnce(StreamFormat) -> OutputCallback,
    {
        let device = self.device(DeviceType::Output)?;
        let format = StreamFormat::new(device.sample_rate(), device.channels());
        let mut on_data = build(format);

        let stream = device
            .device
            .build_output_stream(
                &device.stream_config.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| on_data(data),
                move |err: cpal::StreamError| {
                    on_error(
                        DeviceFailureReason::Stream(DeviceType::Output, err.to_string()).into(),
                    );
                },
                None,
            )
            .map_err(|err| DeviceFailureReason::Build(DeviceType::Output, err.to_string()))?;

        let stream = CpalStream {
            device_type: DeviceType::Output,
            stream,
        };
        stream.play()?;

        tracing::info!(%device, "Output stream running");
        Ok(AudioStream::new(format, stream))
    }
}

struct CpalStream {
    device_type: DeviceType,
    stream: cpal::Stream,
}

impl StreamControl for CpalStream {
    fn play(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|err| DeviceFailureReason::Control(self.device_type, err.to_string()).into())
    }

    fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|err| DeviceFailureReason::Control(self.device_type, err.to_string()).into())
    }
}
