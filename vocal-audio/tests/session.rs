use pretty_assertions::{assert_eq, assert_matches};
use test_log::test;
use tokio::sync::mpsc;
use vocal_audio::backend::{StreamFormat, mock};
use vocal_audio::config::AudioConfig;
use vocal_audio::session::VoiceSession;
use vocal_audio::{AudioError, DeviceType, EncodedChunk, WIRE_SAMPLE_RATE, codec};

const RENDER_TICK: usize = 128;

fn mock_session() -> (VoiceSession<mock::MockBackend>, mock::MockHandle) {
    let (backend, handle) = mock::create(
        StreamFormat::new(48_000, 1),
        StreamFormat::new(WIRE_SAMPLE_RATE, 1),
    );
    (VoiceSession::new(backend, AudioConfig::default()), handle)
}

fn drain(session: &mut VoiceSession<mock::MockBackend>) -> Vec<EncodedChunk> {
    std::iter::from_fn(|| session.poll_chunk()).collect()
}

fn render_tick(handle: &mock::MockHandle) -> [f32; RENDER_TICK] {
    let mut out = [f32::NAN; RENDER_TICK];
    assert!(handle.render(&mut out), "output stream not running");
    out
}

#[test]
fn one_second_round_trip() {
    let (mut session, handle) = mock_session();
    session.session_start().unwrap();

    // 10 ms device blocks at 48 kHz
    let input = vec![0.5f32; 24_000];
    for block in input.chunks(480) {
        assert!(handle.push_input(block));
    }

    let chunks = drain(&mut session);
    let samples: usize = chunks.iter().map(|c| c.len() / 2).sum();
    assert_eq!(samples, 12_000);

    for chunk in &chunks {
        session
            .receive_audio(&codec::to_transport_text(chunk))
            .unwrap();
    }

    let ticks = 12_000usize.div_ceil(RENDER_TICK);
    for tick in 0..ticks - 1 {
        let out = render_tick(&handle);
        assert!(
            out.iter().all(|s| (s - 0.5).abs() < 1e-3),
            "silence inside stream at tick {tick}"
        );
    }

    let last = render_tick(&handle);
    let tail = 12_000 - (ticks - 1) * RENDER_TICK;
    assert!(last[..tail].iter().all(|s| (s - 0.5).abs() < 1e-3));
    assert!(last[tail..].iter().all(|s| *s == 0.0));

    assert_eq!(render_tick(&handle), [0.0; RENDER_TICK]);
    assert_eq!(session.playback_stats().unwrap().buffered_samples, 0);
}

#[test]
fn capture_failure_prevents_session() {
    let (mut session, handle) = mock_session();
    handle.set_input_available(false);

    assert_matches!(
        session.session_start(),
        Err(AudioError::Device(_))
    );
    assert!(!session.is_active());
    assert!(!handle.output_open());
    assert!(drain(&mut session).is_empty());
}

#[test]
fn playback_failure_releases_capture() {
    let (mut session, handle) = mock_session();
    handle.set_output_available(false);

    assert_matches!(
        session.session_start(),
        Err(AudioError::Device(_))
    );
    assert!(!session.is_active());
    assert!(!handle.input_open());
}

#[test]
fn stop_is_idempotent_and_discards_audio() {
    let (mut session, handle) = mock_session();
    session.session_stop();

    session.session_start().unwrap();
    session
        .receive_pcm(&codec::encode_pcm16(&[0.5; 1024]))
        .unwrap();

    session.session_stop();
    session.session_stop();
    assert!(!session.is_active());
    assert!(!handle.input_open());
    assert!(!handle.output_open());

    session.session_start().unwrap();
    assert_eq!(render_tick(&handle), [0.0; RENDER_TICK]);
}

#[test]
fn restart_does_not_forward_previous_capture() {
    let (mut session, handle) = mock_session();
    session.session_start().unwrap();
    assert!(handle.push_input(&[0.5; 480]));
    assert!(handle.push_input(&[0.5; 480]));

    session.session_stop();
    session.session_start().unwrap();
    assert!(drain(&mut session).is_empty());

    assert!(handle.push_input(&[-0.25; 480]));
    let chunks = drain(&mut session);
    assert_eq!(chunks.len(), 1);
    assert!(
        codec::decode_pcm16(&chunks[0])
            .unwrap()
            .samples()
            .iter()
            .all(|s| (s + 0.25).abs() < 1e-3)
    );
}

#[test]
fn audio_without_session_is_ignored() {
    let (mut session, _handle) = mock_session();
    assert!(session.receive_audio(&codec::to_transport_text(&[0, 0])).is_ok());
}

#[test]
fn malformed_chunk_is_dropped() {
    let (mut session, handle) = mock_session();
    session.session_start().unwrap();

    let odd = codec::to_transport_text(&[1, 2, 3]);
    assert_matches!(session.receive_audio(&odd), Err(AudioError::Format(_)));
    assert_matches!(session.receive_audio("%%%"), Err(AudioError::Format(_)));

    let valid = codec::to_transport_text(&codec::encode_pcm16(&[-0.5; RENDER_TICK]));
    session.receive_audio(&valid).unwrap();

    assert_eq!(render_tick(&handle), [-0.5; RENDER_TICK]);
    assert_eq!(session.playback_stats().unwrap().format_drops, 2);
}

#[test]
fn pause_keeps_position() {
    let (mut session, handle) = mock_session();
    session.session_start().unwrap();

    let samples: Vec<f32> = (0..2 * RENDER_TICK).map(|i| -(i as f32) / 1024.0).collect();
    session
        .receive_pcm(&codec::encode_pcm16(&samples))
        .unwrap();

    let first = render_tick(&handle);
    assert_eq!(first[..], samples[..RENDER_TICK]);

    session.pause().unwrap();
    assert!(!handle.render(&mut [0.0; RENDER_TICK]));

    session.resume().unwrap();
    let second = render_tick(&handle);
    assert_eq!(second[..], samples[RENDER_TICK..]);
}

#[test]
fn rate_mismatch_keeps_playing() {
    let (mut session, handle) = mock_session();
    session.session_start().unwrap();

    assert!(session.declare_wire_rate(WIRE_SAMPLE_RATE).is_ok());
    assert_matches!(
        session.declare_wire_rate(16_000),
        Err(AudioError::RateMismatch {
            declared: 16_000,
            expected: WIRE_SAMPLE_RATE
        })
    );

    session
        .receive_pcm(&codec::encode_pcm16(&[-0.25; RENDER_TICK]))
        .unwrap();
    assert_eq!(render_tick(&handle), [-0.25; RENDER_TICK]);
}

#[test]
fn input_rate_change_applies_to_next_block() {
    let (mut session, handle) = mock_session();
    session.session_start().unwrap();

    session.capture().set_input_rate(WIRE_SAMPLE_RATE);
    assert!(handle.push_input(&[0.1; RENDER_TICK]));

    let chunks = drain(&mut session);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), RENDER_TICK * 2);
}

#[test]
fn device_fault_is_reported() {
    let (backend, handle) = mock::create(
        StreamFormat::new(44_100, 2),
        StreamFormat::new(WIRE_SAMPLE_RATE, 2),
    );
    let (faults_tx, mut faults_rx) = mpsc::unbounded_channel();
    let mut session =
        VoiceSession::new(backend, AudioConfig::default()).with_fault_sender(faults_tx);

    session.session_start().unwrap();

    handle.fail(DeviceType::Output, "device unplugged");
    assert_matches!(faults_rx.try_recv(), Ok(AudioError::Device(_)));
}

#[test]
fn volume_persists_across_sessions() {
    let (mut session, handle) = mock_session();
    session.set_volume(0.5);

    session.session_start().unwrap();
    assert_eq!(session.playback().unwrap().volume(), 0.5);

    session
        .receive_pcm(&codec::encode_pcm16(&[-1.0; RENDER_TICK]))
        .unwrap();
    assert_eq!(render_tick(&handle), [-0.5; RENDER_TICK]);
}
