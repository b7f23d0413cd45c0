use crate::{DeviceType, MIN_OUTPUT_FRAME, WIRE_SAMPLE_RATE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input: AudioDeviceConfig,
    pub output: AudioDeviceConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input: AudioDeviceConfig::from(DeviceType::Input),
            output: AudioDeviceConfig::from(DeviceType::Output),
            capture: CaptureConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDeviceConfig {
    /// Name of the audio backend host, None means default host.
    pub host_name: Option<String>,
    /// Name of the device, None means the host's default device.
    pub device_name: Option<String>,
    pub channels: u16,
}

impl Default for AudioDeviceConfig {
    fn default() -> Self {
        AudioDeviceConfig {
            host_name: None,
            device_name: None,
            channels: 2,
        }
    }
}

impl From<DeviceType> for AudioDeviceConfig {
    fn from(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Input => AudioDeviceConfig {
                channels: 1,
                ..Default::default()
            },
            DeviceType::Output => AudioDeviceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate encoded chunks are produced at.
    pub target_sample_rate: u32,
    /// Minimum number of resampled samples per emitted chunk.
    pub min_output_frame: usize,
    /// Resampled batches that may wait in the handoff out of the audio callback. All batch
    /// buffers are allocated up front, so this also bounds capture memory.
    pub chunk_channel_capacity: usize,
    /// How often the general domain collects batches from the handoff and encodes them.
    pub drain_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: WIRE_SAMPLE_RATE,
            min_output_frame: MIN_OUTPUT_FRAME,
            chunk_channel_capacity: 512,
            drain_interval_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sample rate incoming chunks are expected at.
    pub wire_sample_rate: u32,
    /// Decoded frames that may wait in the handoff to the render callback.
    pub jitter_capacity_frames: usize,
    /// Initial output gain.
    pub volume: f32,
    /// Duration over which volume changes are ramped.
    pub volume_ramp_ms: u32,
    /// Largest block processed per render pass. Bigger device blocks are rendered in slices.
    pub max_block_size: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            wire_sample_rate: WIRE_SAMPLE_RATE,
            jitter_capacity_frames: 512,
            volume: 1.0,
            volume_ramp_ms: 20,
            max_block_size: 4096,
        }
    }
}

impl PlaybackConfig {
    pub(crate) fn ramp_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.volume_ramp_ms as u64 / 1000) as usize
    }
}
