//! Microphone capture.
//!
//! The input callback downmixes, resamples and hands finished batches to the general domain
//! over a bounded single-producer/single-consumer ring. Encoding happens on the other side in
//! [`CapturePipeline::poll_chunk`]. Batch buffers are allocated up front and circulate through
//! a second ring, so the callback never allocates.

use crate::backend::{
    AudioBackend, AudioStream, FaultSender, InputCallback, StreamFormat, fault_reporter,
};
use crate::config::CaptureConfig;
use crate::dsp::downmix_interleaved_to_mono;
use crate::error::AudioError;
use crate::resampler::Resampler;
use crate::{EncodedChunk, codec};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::instrument;

/// Preallocated room for mono input and the resampler's first batch, in samples.
const SCRATCH_CAPACITY: usize = 8192;
/// Pooled batch buffers hold this many minimum batches before they would have to grow.
const POOLED_BATCHES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub chunks_emitted: u64,
    /// Batches lost because the handoff was full, i.e. nobody collected chunks in time.
    pub chunks_dropped: u64,
}

#[derive(Debug, Default)]
struct CaptureShared {
    /// Input rate waiting to be applied by the callback. Zero when nothing is pending.
    pending_rate: AtomicU32,
    chunks_emitted: AtomicU64,
    chunks_dropped: AtomicU64,
}

impl CaptureShared {
    fn stats(&self) -> CaptureStats {
        CaptureStats {
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Callback side of the batch handoff.
struct BatchSender {
    ready: HeapProd<Vec<f32>>,
    pool: HeapCons<Vec<f32>>,
}

/// General-domain side of the batch handoff.
struct ChunkReceiver {
    ready: HeapCons<Vec<f32>>,
    pool: HeapProd<Vec<f32>>,
}

impl ChunkReceiver {
    /// Takes the oldest finished batch, encodes it and returns its buffer to the pool.
    fn poll(&mut self) -> Option<EncodedChunk> {
        let batch = self.ready.try_pop()?;
        let chunk = codec::encode_pcm16(&batch);
        // The pool has room for every buffer, so this cannot fail.
        let _ = self.pool.try_push(batch);
        Some(chunk)
    }
}

/// Creates the batch handoff with `chunk_channel_capacity` pooled buffers.
fn capture_channel(config: &CaptureConfig) -> (BatchSender, ChunkReceiver) {
    let capacity = config.chunk_channel_capacity.max(1);
    let (ready_tx, ready_rx) = HeapRb::<Vec<f32>>::new(capacity).split();
    let (mut pool_tx, pool_rx) = HeapRb::<Vec<f32>>::new(capacity).split();

    let batch_capacity = config.min_output_frame.max(1) * POOLED_BATCHES;
    pool_tx.push_iter((0..capacity).map(|_| Vec::with_capacity(batch_capacity)));

    (
        BatchSender {
            ready: ready_tx,
            pool: pool_rx,
        },
        ChunkReceiver {
            ready: ready_rx,
            pool: pool_tx,
        },
    )
}

/// Per-session processing state owned by the input callback: downmix, resample, hand off.
struct CaptureProcessor {
    resampler: Resampler,
    channels: usize,
    mono: Vec<f32>,
    /// Batch being filled by the resampler. Swapped for a pooled buffer once handed off.
    batch: Vec<f32>,
    sender: BatchSender,
    shared: Arc<CaptureShared>,
}

impl CaptureProcessor {
    fn new(
        format: StreamFormat,
        config: &CaptureConfig,
        sender: BatchSender,
        shared: Arc<CaptureShared>,
    ) -> Self {
        Self {
            resampler: Resampler::with_min_output_frame(
                format.sample_rate,
                config.target_sample_rate,
                config.min_output_frame,
            ),
            channels: (format.channels as usize).max(1),
            mono: Vec::with_capacity(SCRATCH_CAPACITY),
            batch: Vec::with_capacity(SCRATCH_CAPACITY),
            sender,
            shared,
        }
    }

    /// Handles one interleaved input block from the device.
    fn process(&mut self, interleaved: &[f32]) {
        let pending_rate = self.shared.pending_rate.swap(0, Ordering::AcqRel);
        if pending_rate != 0 {
            self.resampler.set_ratio(pending_rate);
        }

        let block = if self.channels == 1 {
            interleaved
        } else {
            downmix_interleaved_to_mono(interleaved, self.channels, &mut self.mono);
            &self.mono[..]
        };

        if !self.resampler.push_into(block, &mut self.batch) {
            return;
        }

        // Only this side pushes to `ready`, so it cannot fill up after this check.
        if self.sender.ready.is_full() {
            self.shared.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(spare) = self.sender.pool.try_pop() else {
            self.shared.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let batch = std::mem::replace(&mut self.batch, spare);
        if self.sender.ready.try_push(batch).is_ok() {
            self.shared.chunks_emitted.fetch_add(1, Ordering::Relaxed);
        }
    }
}

struct ActiveCapture {
    stream: AudioStream,
    receiver: ChunkReceiver,
    shared: Arc<CaptureShared>,
}

/// Microphone capture: `Idle -> Capturing -> Idle`.
///
/// Every [`CapturePipeline::start`] builds a fresh [`Resampler`] and batch handoff; nothing
/// carries over from a previous session, including chunks nobody collected.
pub struct CapturePipeline<B> {
    backend: B,
    config: CaptureConfig,
    faults: Option<FaultSender>,
    active: Option<ActiveCapture>,
}

impl<B: AudioBackend> CapturePipeline<B> {
    pub fn new(backend: B, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            faults: None,
            active: None,
        }
    }

    /// Streams failing mid-session are reported on `faults`.
    pub fn with_fault_sender(mut self, faults: FaultSender) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn state(&self) -> CaptureState {
        if self.active.is_some() {
            CaptureState::Capturing
        } else {
            CaptureState::Idle
        }
    }

    /// Acquires the input device at its native rate and starts resampling. Chunks are collected
    /// with [`CapturePipeline::poll_chunk`]. On failure the pipeline stays idle.
    #[instrument(level = "debug", skip_all, err)]
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.active.is_some() {
            tracing::warn!("Capture already running, ignoring start");
            return Ok(());
        }

        let shared = Arc::new(CaptureShared::default());
        let callback_shared = shared.clone();
        let config = self.config.clone();
        let (sender, receiver) = capture_channel(&self.config);

        let stream = self.backend.open_input(
            move |format: StreamFormat| -> InputCallback {
                let mut processor = CaptureProcessor::new(format, &config, sender, callback_shared);
                Box::new(move |data: &[f32]| processor.process(data))
            },
            fault_reporter(self.faults.clone(), "input"),
        )?;

        let format = stream.format();
        if format.sample_rate == 0 {
            tracing::warn!("Input device reported no sample rate, holding input until one is set");
        }
        tracing::info!(
            ?format,
            target_sample_rate = self.config.target_sample_rate,
            "Capture started"
        );

        self.active = Some(ActiveCapture {
            stream,
            receiver,
            shared,
        });
        Ok(())
    }

    /// Releases the input device and discards the resampler and any uncollected chunks.
    /// No-op while idle.
    #[instrument(level = "debug", skip(self))]
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            tracing::trace!("Capture already idle");
            return;
        };

        let stats = active.shared.stats();
        drop(active.stream);
        tracing::info!(?stats, "Capture stopped");
    }

    /// Encodes and returns the oldest captured batch, if any. Never blocks.
    pub fn poll_chunk(&mut self) -> Option<EncodedChunk> {
        self.active.as_mut()?.receiver.poll()
    }

    /// Publishes a new input rate. The callback applies it before its next resample.
    pub fn set_input_rate(&self, sample_rate: u32) {
        if let Some(active) = &self.active {
            tracing::debug!(sample_rate, "Updating capture input rate");
            active
                .shared
                .pending_rate
                .store(sample_rate, Ordering::Release);
        }
    }

    pub fn input_format(&self) -> Option<StreamFormat> {
        self.active.as_ref().map(|a| a.stream.format())
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.config.target_sample_rate
    }

    pub fn stats(&self) -> CaptureStats {
        self.active
            .as_ref()
            .map(|a| a.shared.stats())
            .unwrap_or_default()
    }
}
