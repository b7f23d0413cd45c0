use serde::{Deserialize, Serialize};

/// One chunk of captured audio, PCM16 little-endian mono in transport text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChatError {
    pub message: String,
}

impl VoiceChatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ClientEvent {
    SendAudioChunk(AudioChunk),
    VoiceChatError(VoiceChatError),
}

impl ClientEvent {
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

impl From<AudioChunk> for ClientEvent {
    fn from(value: AudioChunk) -> Self {
        Self::SendAudioChunk(value)
    }
}

impl From<VoiceChatError> for ClientEvent {
    fn from(value: VoiceChatError) -> Self {
        Self::VoiceChatError(value)
    }
}
