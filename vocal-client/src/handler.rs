use vocal_audio::backend::AudioBackend;
use vocal_audio::session::VoiceSession;
use vocal_audio::{AudioError, codec};
use vocal_protocol::{AudioChunk, ClientEvent, ServerEvent, VoiceChatError};

/// Maps server events onto the voice session and produces the events sent back.
pub struct EventHandler<B: AudioBackend + Clone> {
    session: VoiceSession<B>,
}

impl<B: AudioBackend + Clone> EventHandler<B> {
    pub fn new(session: VoiceSession<B>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &VoiceSession<B> {
        &self.session
    }

    /// Handles one line of input. Lines that are not a known event are logged and skipped.
    pub fn handle_line(&mut self, line: &str) -> Option<ClientEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match ServerEvent::deserialize(line) {
            Ok(event) => self.handle(event),
            Err(err) => {
                tracing::warn!(?err, "Received malformed server event, skipping");
                None
            }
        }
    }

    pub fn handle(&mut self, event: ServerEvent) -> Option<ClientEvent> {
        match event {
            ServerEvent::VoiceChatStarted => {
                if let Err(err) = self.session.session_start() {
                    return Some(voice_chat_error(&err));
                }
            }
            ServerEvent::VoiceChatStopped => self.session.session_stop(),
            ServerEvent::AudioFormat(format) => {
                if let Err(err) = self.session.declare_wire_rate(format.sample_rate) {
                    tracing::warn!(%err, "Continuing with configured wire rate");
                }
            }
            ServerEvent::AudioDelta(delta) => {
                if let Err(err) = self.session.receive_audio(&delta.delta) {
                    tracing::warn!(%err, "Dropping malformed audio delta");
                }
            }
            ServerEvent::ResponseAudioDone => {
                tracing::trace!(stats = ?self.session.playback_stats(), "Response audio done");
            }
            ServerEvent::SetVolume(volume) => self.session.set_volume(volume.volume),
            ServerEvent::PausePlayback => {
                if let Err(err) = self.session.pause() {
                    return Some(voice_chat_error(&err));
                }
            }
            ServerEvent::ResumePlayback => {
                if let Err(err) = self.session.resume() {
                    return Some(voice_chat_error(&err));
                }
            }
            ServerEvent::Error(err) => {
                tracing::warn!(error = %err.error, "Server reported error");
            }
        }
        None
    }

    /// Collects the chunks captured since the last call, ready for sending. Only the running
    /// session's capture is drained, so audio from a stopped session never leaves.
    pub fn drain_chunks(&mut self) -> Vec<ClientEvent> {
        std::iter::from_fn(|| self.session.poll_chunk())
            .map(|chunk| {
                AudioChunk {
                    audio: codec::to_transport_text(&chunk),
                }
                .into()
            })
            .collect()
    }

    /// A stream failed mid-session. The session is torn down and the server informed.
    pub fn fault(&mut self, err: AudioError) -> Option<ClientEvent> {
        tracing::error!(%err, "Audio device failed, stopping voice session");
        self.session.session_stop();
        Some(voice_chat_error(&err))
    }

    pub fn shutdown(&mut self) {
        self.session.session_stop();
    }
}

fn voice_chat_error(err: &AudioError) -> ClientEvent {
    VoiceChatError::new(err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_matches};
    use vocal_audio::WIRE_SAMPLE_RATE;
    use vocal_audio::backend::{StreamFormat, mock};
    use vocal_audio::config::AudioConfig;

    fn handler() -> (EventHandler<mock::MockBackend>, mock::MockHandle) {
        let (backend, handle) = mock::create(
            StreamFormat::new(48_000, 1),
            StreamFormat::new(WIRE_SAMPLE_RATE, 1),
        );
        let session = VoiceSession::new(backend, AudioConfig::default());
        (EventHandler::new(session), handle)
    }

    #[test]
    fn start_and_stop() {
        let (mut handler, handle) = handler();

        assert_eq!(handler.handle_line(r#"{"type":"voice_chat_started"}"#), None);
        assert!(handler.session().is_active());
        assert!(handle.input_open());
        assert!(handle.output_open());

        assert_eq!(handler.handle_line(r#"{"type":"voice_chat_stopped"}"#), None);
        assert!(!handler.session().is_active());
        assert!(!handle.output_open());
    }

    #[test]
    fn failed_start_reports_error() {
        let (mut handler, handle) = handler();
        handle.set_input_available(false);

        assert_matches!(
            handler.handle(ServerEvent::VoiceChatStarted),
            Some(ClientEvent::VoiceChatError(_))
        );
        assert!(!handler.session().is_active());
    }

    #[test]
    fn captured_audio_is_forwarded() {
        let (mut handler, handle) = handler();
        handler.handle(ServerEvent::VoiceChatStarted);

        assert!(handle.push_input(&[0.0; 256]));
        assert_eq!(
            handler.drain_chunks(),
            vec![ClientEvent::SendAudioChunk(AudioChunk {
                audio: codec::to_transport_text(&[0; 256])
            })]
        );
        assert_eq!(handler.drain_chunks(), vec![]);
    }

    #[test]
    fn stopped_session_audio_is_not_forwarded() {
        let (mut handler, handle) = handler();
        handler.handle(ServerEvent::VoiceChatStarted);
        assert!(handle.push_input(&[0.5; 480]));

        handler.handle(ServerEvent::VoiceChatStopped);
        assert_eq!(handler.drain_chunks(), vec![]);

        handler.handle(ServerEvent::VoiceChatStarted);
        assert_eq!(handler.drain_chunks(), vec![]);

        assert!(handle.push_input(&[0.0; 256]));
        assert_eq!(handler.drain_chunks().len(), 1);
    }

    #[test]
    fn received_audio_is_played() {
        let (mut handler, handle) = handler();
        handler.handle(ServerEvent::VoiceChatStarted);

        let delta = codec::to_transport_text(&codec::encode_pcm16(&[-0.5; 128]));
        let line = format!(r#"{{"type":"response_audio_delta","delta":"{delta}"}}"#);
        assert_eq!(handler.handle_line(&line), None);

        let mut out = [0.0; 128];
        assert!(handle.render(&mut out));
        assert_eq!(out, [-0.5; 128]);
    }

    #[test]
    fn malformed_input_is_skipped() {
        let (mut handler, _handle) = handler();
        handler.handle(ServerEvent::VoiceChatStarted);

        assert_eq!(handler.handle_line("not json"), None);
        assert_eq!(handler.handle_line(""), None);
        assert_eq!(
            handler.handle_line(r#"{"type":"audio_delta","delta":"!!"}"#),
            None
        );
        assert!(handler.session().is_active());
    }

    #[test]
    fn device_fault_stops_session() {
        let (mut handler, handle) = handler();
        handler.handle(ServerEvent::VoiceChatStarted);

        let err = AudioError::Device(vocal_audio::error::DeviceFailureReason::Stream(
            vocal_audio::DeviceType::Input,
            "unplugged".to_string(),
        ));
        assert_matches!(handler.fault(err), Some(ClientEvent::VoiceChatError(_)));
        assert!(!handler.session().is_active());
        assert!(!handle.input_open());
    }
}
