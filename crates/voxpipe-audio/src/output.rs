use cpal::traits::DeviceTrait;
use cpal::{Device, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use voxpipe_core::{AudioError, AudioFrame};

// ── OutputHandle ──────────────────────────────────────────────

#[derive(Clone)]
pub struct OutputHandle {
    playing: Arc<AtomicBool>,
}

impl OutputHandle {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Stop playback output. Idempotent; the device is released when the
    /// owning [`OutputNode`] is dropped.
    pub fn close(&self) {
        self.playing.store(false, Ordering::Relaxed);
    }
}

// ── FrameSink ─────────────────────────────────────────────────

/// Non-blocking enqueue side of the playback ring buffer. Samples that
/// overflow the buffer are dropped; underrun plays silence.
pub struct FrameSink {
    producer: Mutex<HeapProd<i16>>,
}

impl FrameSink {
    pub fn new(producer: HeapProd<i16>) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }

    /// Returns the number of samples actually enqueued.
    pub fn write(&self, frame: &AudioFrame) -> usize {
        match self.producer.lock() {
            Ok(mut prod) => prod.push_slice(&frame.samples),
            Err(_) => 0,
        }
    }
}

// ── OutputNode ────────────────────────────────────────────────

/// Owns the cpal output stream, draining the ring buffer fed by
/// [`FrameSink::write`].
pub struct OutputNode {
    _stream: Stream,
}

impl OutputNode {
    pub fn new(
        device: &Device,
        consumer: HeapCons<i16>,
        sample_rate: u32,
        channels: u16,
        buffer_size: u32,
    ) -> Result<(Self, OutputHandle), AudioError> {
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(buffer_size),
        };

        let consumer = Arc::new(Mutex::new(consumer));
        let playing = Arc::new(AtomicBool::new(true));
        let playing_flag = Arc::clone(&playing);
        let playing_err = Arc::clone(&playing);

        // Playback is a secondary channel; on a device error just go silent.
        let err_callback = move |err: cpal::StreamError| {
            tracing::error!("output stream error: {}", err);
            playing_err.store(false, Ordering::Relaxed);
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if !playing_flag.load(Ordering::Relaxed) {
                        data.fill(0);
                        return;
                    }
                    if let Ok(mut cons) = consumer.lock() {
                        for sample in data.iter_mut() {
                            *sample = cons.try_pop().unwrap_or(0);
                        }
                    } else {
                        // Mutex poisoned — fill with silence
                        data.fill(0);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    AudioError::DeviceUnavailable("output device not available".to_string())
                }
                other => AudioError::StreamBuild(other.to_string()),
            })?;

        let handle = OutputHandle { playing };
        Ok((Self { _stream: stream }, handle))
    }
}
