use serde::{Deserialize, Serialize};

/// Declares the sample rate of the audio deltas that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
}

/// One chunk of remote audio, PCM16 little-endian mono in transport text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDelta {
    pub delta: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetVolume {
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerEvent {
    VoiceChatStarted,
    VoiceChatStopped,
    AudioFormat(AudioFormat),
    #[serde(alias = "response_audio_delta")]
    AudioDelta(AudioDelta),
    ResponseAudioDone,
    SetVolume(SetVolume),
    PausePlayback,
    ResumePlayback,
    Error(ServerError),
}

impl ServerEvent {
    pub fn serialize(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn into_json(self) -> serde_json::Result<String> {
        self.serialize()
    }

    pub fn deserialize(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

impl From<AudioFormat> for ServerEvent {
    fn from(value: AudioFormat) -> Self {
        Self::AudioFormat(value)
    }
}

impl From<AudioDelta> for ServerEvent {
    fn from(value: AudioDelta) -> Self {
        Self::AudioDelta(value)
    }
}

impl From<SetVolume> for ServerEvent {
    fn from(value: SetVolume) -> Self {
        Self::SetVolume(value)
    }
}

impl From<ServerError> for ServerEvent {
    fn from(value: ServerError) -> Self {
        Self::Error(value)
    }
}
