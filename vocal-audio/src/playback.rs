//! Jitter-buffered playback of received audio.
//!
//! Playback is split in two halves living in different scheduling domains:
//!
//! - [`PlaybackFeeder`] runs wherever chunks arrive. It decodes them and hands the resulting
//!   frames over a bounded single-producer/single-consumer ring.
//! - [`PlaybackRenderer`] runs inside the device's render callback. It moves handed-over frames
//!   into its [`JitterBuffer`] and produces exactly the requested number of samples per tick,
//!   padding with silence when it runs dry.
//!
//! Neither half ever waits on the other. Consumed frame allocations travel back to the feeder
//! over a second ring, so the render callback neither allocates nor frees in steady state.

use crate::backend::{
    AudioBackend, AudioStream, FaultSender, OutputCallback, StreamFormat, fault_reporter,
};
use crate::codec;
use crate::config::PlaybackConfig;
use crate::dsp::{GainRamp, upmix_mono_to_interleaved};
use crate::error::{AudioError, DeviceFailureReason};
use crate::{DeviceType, SampleFrame};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use tracing::instrument;

/// Ordered queue of decoded frames plus a read cursor into the head frame.
///
/// Frames are consumed strictly in the order they were pushed.
#[derive(Debug, Default)]
pub struct JitterBuffer {
    frames: VecDeque<SampleFrame>,
    cursor: usize,
    buffered: usize,
}

impl JitterBuffer {
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(frames),
            cursor: 0,
            buffered: 0,
        }
    }

    /// Appends a frame to the tail. Empty frames carry no audio and are ignored.
    pub fn push(&mut self, frame: SampleFrame) {
        if frame.is_empty() {
            return;
        }
        self.buffered += frame.len();
        self.frames.push_back(frame);
    }

    /// Samples not yet rendered, across all queued frames.
    pub fn buffered_samples(&self) -> usize {
        self.buffered
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered == 0
    }

    /// Fills `out` from the head of the queue, continuing across frame boundaries.
    ///
    /// Whatever cannot be filled from buffered audio is set to silence. Fully consumed frames
    /// are passed to `on_consumed`. Returns the number of samples taken from the buffer.
    pub fn render(&mut self, out: &mut [f32], mut on_consumed: impl FnMut(SampleFrame)) -> usize {
        let mut written = 0;

        while written < out.len() {
            let Some(head) = self.frames.front() else {
                break;
            };

            let available = &head.samples()[self.cursor..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            let exhausted = self.cursor + n >= head.len();

            written += n;
            self.cursor += n;
            self.buffered -= n;

            if exhausted {
                self.cursor = 0;
                if let Some(frame) = self.frames.pop_front() {
                    on_consumed(frame);
                }
            }
        }

        out[written..].fill(0.0);
        written
    }

    /// Drops all queued frames and rewinds the cursor.
    pub fn clear(&mut self, mut on_discarded: impl FnMut(SampleFrame)) {
        self.frames.drain(..).for_each(&mut on_discarded);
        self.cursor = 0;
        self.buffered = 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Samples waiting in the jitter buffer as of the last render tick.
    pub buffered_samples: usize,
    /// Render ticks that had to be padded with silence.
    pub underruns: u64,
    /// Decoded frames dropped because the handoff to the render callback was full.
    pub overflow_drops: u64,
    /// Chunks dropped because they could not be decoded.
    pub format_drops: u64,
}

#[derive(Debug)]
struct PlaybackShared {
    /// Bumped on every reset; frames tagged with an older generation are stale.
    generation: AtomicU64,
    /// Target gain, as `f32` bits.
    volume: AtomicU32,
    buffered: AtomicUsize,
    underruns: AtomicU64,
    overflow_drops: AtomicU64,
    format_drops: AtomicU64,
}

#[derive(Debug)]
struct Handoff {
    generation: u64,
    frame: SampleFrame,
}

/// Creates a connected feeder/renderer pair for mono output at `sample_rate`.
pub fn playback_channel(
    config: &PlaybackConfig,
    sample_rate: u32,
) -> (PlaybackFeeder, PlaybackRenderer) {
    let capacity = config.jitter_capacity_frames.max(1);
    let (frames_tx, frames_rx) = HeapRb::<Handoff>::new(capacity).split();
    let (recycled_tx, recycled_rx) = HeapRb::<Vec<f32>>::new(capacity * 2 + 1).split();

    let volume = sanitize_gain(config.volume);
    let shared = Arc::new(PlaybackShared {
        generation: AtomicU64::new(0),
        volume: AtomicU32::new(volume.to_bits()),
        buffered: AtomicUsize::new(0),
        underruns: AtomicU64::new(0),
        overflow_drops: AtomicU64::new(0),
        format_drops: AtomicU64::new(0),
    });

    let feeder = PlaybackFeeder {
        frames: frames_tx,
        recycled: recycled_rx,
        wire_sample_rate: config.wire_sample_rate,
        shared: shared.clone(),
    };
    let renderer = PlaybackRenderer {
        frames: frames_rx,
        recycled: recycled_tx,
        jitter: JitterBuffer::with_capacity(capacity),
        capacity,
        gain: GainRamp::new(volume, config.ramp_samples(sample_rate)),
        generation: 0,
        mono: vec![0.0; config.max_block_size.max(1)],
        channels: 1,
        shared,
    };

    (feeder, renderer)
}

/// Feed side of playback. Lives outside the real-time domain.
pub struct PlaybackFeeder {
    frames: HeapProd<Handoff>,
    recycled: HeapCons<Vec<f32>>,
    wire_sample_rate: u32,
    shared: Arc<PlaybackShared>,
}

impl PlaybackFeeder {
    /// Decodes a PCM16 chunk and queues it behind everything enqueued before.
    ///
    /// A malformed chunk is dropped and leaves the queued audio untouched.
    pub fn enqueue(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        let mut samples = self.recycled.try_pop().unwrap_or_default();
        if let Err(err) = codec::decode_pcm16_into(chunk, &mut samples) {
            self.shared.format_drops.fetch_add(1, Ordering::Relaxed);
            return Err(err.into());
        }
        if samples.is_empty() {
            return Ok(());
        }

        let handoff = Handoff {
            generation: self.shared.generation.load(Ordering::Acquire),
            frame: SampleFrame::new(samples, self.wire_sample_rate),
        };
        if let Err(rejected) = self.frames.try_push(handoff) {
            let dropped = self.shared.overflow_drops.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                samples = rejected.frame.len(),
                dropped,
                "Playback handoff full, dropping frame"
            );
        }
        Ok(())
    }

    /// Like [`PlaybackFeeder::enqueue`], for a chunk wrapped in transport text.
    pub fn enqueue_text(&mut self, text: &str) -> Result<(), AudioError> {
        let chunk = codec::from_transport_text(text).inspect_err(|_| {
            self.shared.format_drops.fetch_add(1, Ordering::Relaxed);
        })?;
        self.enqueue(&chunk)
    }

    /// Sets the gain for future samples. The renderer ramps towards it instead of stepping.
    pub fn set_volume(&self, gain: f32) {
        self.shared
            .volume
            .store(sanitize_gain(gain).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.shared.volume.load(Ordering::Relaxed))
    }

    /// Discards all queued audio. The renderer drops its buffer on its next tick, which may be
    /// much later while paused; the buffered gauge reads zero right away.
    pub fn reset(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.buffered.store(0, Ordering::Relaxed);
        tracing::trace!(generation, "Playback reset requested");
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            buffered_samples: self.shared.buffered.load(Ordering::Relaxed),
            underruns: self.shared.underruns.load(Ordering::Relaxed),
            overflow_drops: self.shared.overflow_drops.load(Ordering::Relaxed),
            format_drops: self.shared.format_drops.load(Ordering::Relaxed),
        }
    }
}

/// Render side of playback. Owned by the device's output callback.
pub struct PlaybackRenderer {
    frames: HeapCons<Handoff>,
    recycled: HeapProd<Vec<f32>>,
    jitter: JitterBuffer,
    capacity: usize,
    gain: GainRamp,
    generation: u64,
    mono: Vec<f32>,
    channels: usize,
    shared: Arc<PlaybackShared>,
}

impl PlaybackRenderer {
    /// Sets the channel count of interleaved blocks passed to [`PlaybackRenderer::render_interleaved`].
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = (channels as usize).max(1);
        self
    }

    /// Runs one mono render tick, filling all of `out`. Returns the number of samples that came
    /// from buffered audio; the rest is silence.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        self.sync();

        let recycled = &mut self.recycled;
        let written = self
            .jitter
            .render(out, |frame| recycle(recycled, frame));

        if written < out.len() {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
        self.gain.apply(out);
        self.shared
            .buffered
            .store(self.jitter.buffered_samples(), Ordering::Relaxed);

        written
    }

    /// Renders into an interleaved block, duplicating the mono signal across all channels.
    pub fn render_interleaved(&mut self, out: &mut [f32]) {
        let channels = self.channels;
        let max_frames = self.mono.len();
        for block in out.chunks_mut(max_frames * channels) {
            let frames = block.len() / channels;
            let mut mono = std::mem::take(&mut self.mono);
            self.render(&mut mono[..frames]);
            upmix_mono_to_interleaved(&mono[..frames], channels, block);
            self.mono = mono;
            // Trailing partial frame, if the device ever hands one out.
            block[frames * channels..].fill(0.0);
        }
    }

    pub fn buffered_samples(&self) -> usize {
        self.jitter.buffered_samples()
    }

    fn sync(&mut self) {
        let generation = self.shared.generation.load(Ordering::Acquire);
        if generation != self.generation {
            self.discard_buffered(generation);
        }

        while self.jitter.frame_count() < self.capacity {
            let Some(handoff) = self.frames.try_pop() else {
                break;
            };

            if handoff.generation < self.generation {
                recycle(&mut self.recycled, handoff.frame);
                continue;
            }
            if handoff.generation > self.generation {
                // Reset happened between our generation check and this frame being queued.
                self.discard_buffered(handoff.generation);
            }
            self.jitter.push(handoff.frame);
        }

        self.gain.set_target(f32::from_bits(
            self.shared.volume.load(Ordering::Relaxed),
        ));
    }

    fn discard_buffered(&mut self, generation: u64) {
        let recycled = &mut self.recycled;
        self.jitter.clear(|frame| recycle(recycled, frame));
        self.generation = generation;
    }
}

#[inline]
fn recycle(recycled: &mut HeapProd<Vec<f32>>, frame: SampleFrame) {
    // A full return ring just means the allocation is freed instead of reused.
    let _ = recycled.try_push(frame.into_samples());
}

fn sanitize_gain(gain: f32) -> f32 {
    if gain.is_finite() { gain.max(0.0) } else { 0.0 }
}

/// Continuous playback through an output device.
pub struct PlaybackEngine {
    stream: AudioStream,
    feeder: PlaybackFeeder,
    wire_sample_rate: u32,
    paused: bool,
}

impl PlaybackEngine {
    /// Opens the output device and starts rendering. Until audio is enqueued, ticks are silent.
    #[instrument(level = "debug", skip_all, err)]
    pub fn start<B: AudioBackend>(
        backend: &B,
        config: &PlaybackConfig,
        faults: Option<FaultSender>,
    ) -> Result<Self, AudioError> {
        let mut feeder = None;
        let stream = backend.open_output(
            |format: StreamFormat| -> OutputCallback {
                let (tx, renderer) = playback_channel(config, format.sample_rate);
                feeder = Some(tx);
                let mut renderer = renderer.with_channels(format.channels);
                Box::new(move |data: &mut [f32]| renderer.render_interleaved(data))
            },
            fault_reporter(faults, "output"),
        )?;

        let feeder = feeder.ok_or_else(|| {
            DeviceFailureReason::Build(DeviceType::Output, "render callback was not built".to_string())
        })?;

        let format = stream.format();
        if format.sample_rate != config.wire_sample_rate {
            let err = AudioError::RateMismatch {
                declared: format.sample_rate,
                expected: config.wire_sample_rate,
            };
            tracing::warn!(%err, "Output device does not run at the wire rate, playing back unconverted");
        }

        tracing::info!(?format, "Playback started");
        Ok(Self {
            stream,
            feeder,
            wire_sample_rate: config.wire_sample_rate,
            paused: false,
        })
    }

    pub fn format(&self) -> StreamFormat {
        self.stream.format()
    }

    pub fn enqueue(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        self.feeder.enqueue(chunk)
    }

    pub fn enqueue_text(&mut self, text: &str) -> Result<(), AudioError> {
        self.feeder.enqueue_text(text)
    }

    pub fn set_volume(&self, gain: f32) {
        self.feeder.set_volume(gain);
    }

    pub fn volume(&self) -> f32 {
        self.feeder.volume()
    }

    /// Stops render ticks altogether. Buffered audio is kept.
    #[instrument(level = "debug", skip(self), err)]
    pub fn pause(&mut self) -> Result<(), AudioError> {
        if !self.paused {
            self.stream.pause()?;
            self.paused = true;
        }
        Ok(())
    }

    /// Resumes render ticks exactly where playback was paused.
    #[instrument(level = "debug", skip(self), err)]
    pub fn resume(&mut self) -> Result<(), AudioError> {
        if self.paused {
            self.stream.play()?;
            self.paused = false;
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Discards buffered audio and the read cursor.
    pub fn reset(&self) {
        self.feeder.reset();
    }

    /// Checks the wire rate announced by the remote side against the configured one.
    ///
    /// On mismatch playback keeps running at the configured rate.
    pub fn declare_wire_rate(&self, sample_rate: u32) -> Result<(), AudioError> {
        if sample_rate != self.wire_sample_rate {
            let err = AudioError::RateMismatch {
                declared: sample_rate,
                expected: self.wire_sample_rate,
            };
            tracing::warn!(%err, "Declared wire rate differs, keeping configured rate");
            return Err(err);
        }
        Ok(())
    }

    pub fn stats(&self) -> PlaybackStats {
        self.feeder.stats()
    }
}
