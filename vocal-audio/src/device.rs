use crate::WIRE_SAMPLE_RATE;
use crate::config::AudioDeviceConfig;
use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SupportedStreamConfig, SupportedStreamConfigRange};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Input => write!(f, "input"),
            DeviceType::Output => write!(f, "output"),
        }
    }
}

impl DeviceType {
    /// Rate a stream of this type is preferably opened at. Input runs at the device's native
    /// rate, output at the wire rate so received audio needs no conversion.
    fn preferred_sample_rate(&self) -> Option<u32> {
        match self {
            DeviceType::Input => None,
            DeviceType::Output => Some(WIRE_SAMPLE_RATE),
        }
    }
}

pub struct Device {
    pub device_type: DeviceType,
    pub device: cpal::Device,
    pub stream_config: SupportedStreamConfig,
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} device: {}, stream config: {:?}",
            self.device_type,
            self.device_name(),
            self.stream_config
        )
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("device_type", &self.device_type)
            .field("name", &self.device_name())
            .field("stream_config", &self.stream_config)
            .finish()
    }
}

impl Device {
    #[instrument(level = "trace", err)]
    pub fn new(config: &AudioDeviceConfig, device_type: DeviceType) -> anyhow::Result<Self> {
        tracing::trace!("Initialising device");

        let host = find_host(config.host_name.as_deref())?;
        let device = find_device(&host, &config.device_name, &device_type)?;
        let stream_config = find_supported_stream_config(&device, config, &device_type)?;
        let device = Device {
            device_type,
            stream_config,
            device,
        };

        tracing::debug!(%device, "Device initialised");
        Ok(device)
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or("<unknown>".to_string())
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.stream_config.channels()
    }

    #[instrument(level = "debug", err)]
    pub fn find_default(device_type: DeviceType) -> anyhow::Result<Self> {
        tracing::trace!("Finding default device");

        let host = find_host(None)?;
        let device = match device_type {
            DeviceType::Input => host
                .default_input_device()
                .context("Failed to get default input device")?,
            DeviceType::Output => host
                .default_output_device()
                .context("Failed to get default output device")?,
        };
        let stream_config = find_supported_stream_config(
            &device,
            &AudioDeviceConfig::from(device_type),
            &device_type,
        )?;
        let device = Device {
            device_type,
            device,
            stream_config,
        };

        tracing::debug!(%device, "Device initialised");
        Ok(device)
    }

    #[instrument(level = "debug", err)]
    pub fn find_all(device_type: DeviceType) -> anyhow::Result<Vec<Self>> {
        tracing::trace!("Finding all devices for type {device_type}");

        let host = find_host(None)?;

        let devices = match device_type {
            DeviceType::Input => host.input_devices(),
            DeviceType::Output => host.output_devices(),
        }?;

        let devices: Vec<Self> = devices
            .filter_map(|device| {
                if let Ok(stream_config) = find_supported_stream_config(
                    &device,
                    &AudioDeviceConfig::from(device_type),
                    &device_type,
                ) {
                    Some(Device {
                        device_type,
                        device,
                        stream_config,
                    })
                } else {
                    tracing::warn!(
                        device_name = device.name().unwrap_or("<unknown>".to_string()),
                        "Failed to find supported stream config for device"
                    );
                    None
                }
            })
            .collect();

        Ok(devices)
    }
}

#[instrument(level = "trace", err)]
fn find_host(host_name: Option<&str>) -> anyhow::Result<cpal::Host> {
    tracing::trace!("Trying to find audio host");

    let host_id = match host_name {
        Some(host_name) => {
            let available_hosts = cpal::available_hosts();
            match available_hosts
                .iter()
                .find(|id| id.name().eq_ignore_ascii_case(host_name))
            {
                Some(id) => *id,
                None => {
                    anyhow::bail!(
                        "Unknown audio host '{}'. Available: {:?}",
                        host_name,
                        available_hosts
                            .iter()
                            .map(|id| id.name())
                            .collect::<Vec<_>>()
                    );
                }
            }
        }
        None => cpal::default_host().id(),
    };

    cpal::host_from_id(host_id).context("Failed to get audio host")
}

fn list_devices(host: &cpal::Host, device_type: &DeviceType) -> anyhow::Result<Vec<cpal::Device>> {
    Ok(match device_type {
        DeviceType::Input => host
            .input_devices()
            .context("Failed to get input devices")?
            .collect(),
        DeviceType::Output => host
            .output_devices()
            .context("Failed to get output devices")?
            .collect(),
    })
}

#[instrument(level = "trace", skip(host), err)]
fn find_device(
    host: &cpal::Host,
    device_name: &Option<String>,
    device_type: &DeviceType,
) -> anyhow::Result<cpal::Device> {
    tracing::trace!("Trying to find device");

    match device_name {
        Some(device_name) => {
            let devices = list_devices(host, device_type)?;
            let names = devices
                .iter()
                .map(|d| d.name().unwrap_or("<unknown>".to_string()))
                .collect::<Vec<_>>();

            let mut matching_devices = devices
                .into_iter()
                .filter(|device| {
                    device
                        .name()
                        .unwrap_or("".into())
                        .eq_ignore_ascii_case(device_name)
                })
                .collect::<Vec<_>>();

            match matching_devices.len() {
                0 => anyhow::bail!(
                    "Unknown {} device '{}'. Available: {:?}",
                    device_type,
                    device_name,
                    names
                ),
                1 => Ok(matching_devices.remove(0)),
                _ => anyhow::bail!(
                    "Multiple matching {} devices '{}' found",
                    device_type,
                    device_name,
                ),
            }
        }
        None => match device_type {
            DeviceType::Input => host
                .default_input_device()
                .context("Failed to get default input device"),
            DeviceType::Output => host
                .default_output_device()
                .context("Failed to get default output device"),
        },
    }
}

#[instrument(level = "trace", skip(device), err)]
fn find_supported_stream_config(
    device: &cpal::Device,
    config: &AudioDeviceConfig,
    device_type: &DeviceType,
) -> anyhow::Result<SupportedStreamConfig> {
    tracing::trace!("Trying to find supported stream config");

    let default_rate = match device_type {
        DeviceType::Input => device.default_input_config(),
        DeviceType::Output => device.default_output_config(),
    }
    .map(|c| c.sample_rate().0)
    .ok();

    let configs: Vec<SupportedStreamConfigRange> = match device_type {
        DeviceType::Input => device
            .supported_input_configs()
            .context("Failed to get supported input stream configs")?
            .collect(),
        DeviceType::Output => device
            .supported_output_configs()
            .context("Failed to get supported output stream configs")?
            .collect(),
    };

    select_stream_config(
        &configs,
        config.channels,
        [device_type.preferred_sample_rate(), default_rate],
    )
    .ok_or_else(|| anyhow::anyhow!("No supported {} stream config found", device_type))
}

/// Picks an F32 config, preferring the requested channel count. Devices offering only other
/// channel counts are still accepted since the pipelines downmix and upmix any layout.
///
/// Rates are tried in order; if none fits, the first candidate's maximum rate is used.
fn select_stream_config(
    configs: &[SupportedStreamConfigRange],
    channels: u16,
    rates: [Option<u32>; 2],
) -> Option<SupportedStreamConfig> {
    let f32_configs = configs
        .iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32);
    let mut candidates = f32_configs
        .clone()
        .filter(|c| c.channels() == channels)
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        tracing::debug!(channels, "No config with requested channel count, using any layout");
        candidates = f32_configs.collect();
    }

    for rate in rates.into_iter().flatten() {
        if let Some(range) = candidates
            .iter()
            .find(|c| c.min_sample_rate().0 <= rate && c.max_sample_rate().0 >= rate)
        {
            return Some((*range).clone().with_sample_rate(cpal::SampleRate(rate)));
        }
    }

    candidates
        .first()
        .map(|range| (*range).clone().with_max_sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize};
    use pretty_assertions::assert_eq;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_requested_channels_and_rate() {
        let configs = [
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::F32),
        ];
        let config =
            select_stream_config(&configs, 1, [Some(WIRE_SAMPLE_RATE), Some(48_000)]).unwrap();
        assert_eq!(config.channels(), 1);
        assert_eq!(config.sample_rate().0, WIRE_SAMPLE_RATE);
    }

    #[test]
    fn falls_back_to_other_channel_count() {
        let configs = [
            range(1, 48_000, 48_000, SampleFormat::I16),
            range(2, 44_100, 48_000, SampleFormat::F32),
        ];
        let config = select_stream_config(&configs, 1, [None, Some(48_000)]).unwrap();
        assert_eq!(config.channels(), 2);
        assert_eq!(config.sample_format(), SampleFormat::F32);
        assert_eq!(config.sample_rate().0, 48_000);
    }

    #[test]
    fn uses_max_rate_when_no_rate_fits() {
        let configs = [range(1, 8_000, 16_000, SampleFormat::F32)];
        let config = select_stream_config(&configs, 1, [Some(WIRE_SAMPLE_RATE), None]).unwrap();
        assert_eq!(config.sample_rate().0, 16_000);
    }

    #[test]
    fn rejects_devices_without_f32() {
        let configs = [range(1, 8_000, 48_000, SampleFormat::I16)];
        assert!(select_stream_config(&configs, 1, [None, None]).is_none());
    }
}
