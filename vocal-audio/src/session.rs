use crate::backend::{AudioBackend, FaultSender};
use crate::capture::{CapturePipeline, CaptureState};
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::playback::{PlaybackEngine, PlaybackStats};
use crate::EncodedChunk;
use tracing::instrument;

/// Capture and playback for one voice session at a time, driven by the session layer's
/// lifecycle signals.
///
/// Starting a session always begins from an empty jitter buffer and a fresh resampler.
pub struct VoiceSession<B: AudioBackend + Clone> {
    backend: B,
    config: AudioConfig,
    faults: Option<FaultSender>,
    capture: CapturePipeline<B>,
    playback: Option<PlaybackEngine>,
}

impl<B: AudioBackend + Clone> VoiceSession<B> {
    pub fn new(backend: B, config: AudioConfig) -> Self {
        Self {
            capture: CapturePipeline::new(backend.clone(), config.capture.clone()),
            backend,
            config,
            faults: None,
            playback: None,
        }
    }

    /// Device failures after a session started are reported on `faults`.
    pub fn with_fault_sender(mut self, faults: FaultSender) -> Self {
        self.capture = self.capture.with_fault_sender(faults.clone());
        self.faults = Some(faults);
        self
    }

    pub fn is_active(&self) -> bool {
        self.capture.state() == CaptureState::Capturing || self.playback.is_some()
    }

    /// Starts capture, then playback. Capture is acquired first so a missing microphone is
    /// reported before any chunk is emitted. If playback cannot start, capture is released again.
    #[instrument(level = "info", skip_all, err)]
    pub fn session_start(&mut self) -> Result<(), AudioError> {
        if self.is_active() {
            tracing::debug!("Session already active, restarting with fresh state");
            self.session_stop();
        }

        self.capture.start()?;

        match PlaybackEngine::start(&self.backend, &self.config.playback, self.faults.clone()) {
            Ok(playback) => {
                self.playback = Some(playback);
                tracing::info!("Voice session started");
                Ok(())
            }
            Err(err) => {
                self.capture.stop();
                Err(err)
            }
        }
    }

    /// Stops capture and discards all buffered playback. Safe to call at any time.
    #[instrument(level = "info", skip_all)]
    pub fn session_stop(&mut self) {
        self.capture.stop();

        if let Some(playback) = self.playback.take() {
            playback.reset();
            tracing::info!(stats = ?playback.stats(), "Voice session stopped");
        }
    }

    /// Encodes and returns the oldest chunk captured in the current session, if any.
    pub fn poll_chunk(&mut self) -> Option<EncodedChunk> {
        self.capture.poll_chunk()
    }

    /// Queues a received chunk in transport text. Ignored while no session is running.
    pub fn receive_audio(&mut self, text: &str) -> Result<(), AudioError> {
        match self.playback.as_mut() {
            Some(playback) => playback.enqueue_text(text),
            None => {
                tracing::debug!("Received audio without active session, ignoring");
                Ok(())
            }
        }
    }

    /// Queues a received raw PCM16 chunk. Ignored while no session is running.
    pub fn receive_pcm(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        match self.playback.as_mut() {
            Some(playback) => playback.enqueue(chunk),
            None => {
                tracing::debug!("Received audio without active session, ignoring");
                Ok(())
            }
        }
    }

    /// Checks the wire rate announced for this session against both directions.
    ///
    /// A mismatch is reported but changes nothing; audio keeps flowing at the configured rate.
    pub fn declare_wire_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        let expected = self.capture.target_sample_rate();
        if sample_rate != expected {
            tracing::warn!(
                declared = sample_rate,
                expected,
                "Declared wire rate differs from capture rate"
            );
            return Err(AudioError::RateMismatch {
                declared: sample_rate,
                expected,
            });
        }

        match &self.playback {
            Some(playback) => playback.declare_wire_rate(sample_rate),
            None => Ok(()),
        }
    }

    /// Sets playback volume, kept for later sessions as well.
    pub fn set_volume(&mut self, gain: f32) {
        self.config.playback.volume = gain;
        if let Some(playback) = &self.playback {
            playback.set_volume(gain);
        }
    }

    pub fn pause(&mut self) -> Result<(), AudioError> {
        match self.playback.as_mut() {
            Some(playback) => playback.pause(),
            None => Ok(()),
        }
    }

    pub fn resume(&mut self) -> Result<(), AudioError> {
        match self.playback.as_mut() {
            Some(playback) => playback.resume(),
            None => Ok(()),
        }
    }

    pub fn capture(&self) -> &CapturePipeline<B> {
        &self.capture
    }

    pub fn playback(&self) -> Option<&PlaybackEngine> {
        self.playback.as_ref()
    }

    pub fn playback_stats(&self) -> Option<PlaybackStats> {
        self.playback.as_ref().map(PlaybackEngine::stats)
    }
}
