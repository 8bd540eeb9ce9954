use cpal::traits::DeviceTrait;
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use voxpipe_core::{AudioError, AudioFrame};

/// One item on a running capture stream: a frame, or the device error that
/// ended the stream. At most one `Err` is ever sent, after the last frame.
pub type CaptureItem = Result<AudioFrame, AudioError>;

// ── CaptureHandle ─────────────────────────────────────────────

/// Shared control surface for a running capture stream. Cloneable; safe to
/// use from any thread.
#[derive(Clone)]
pub struct CaptureHandle {
    open: Arc<AtomicBool>,
}

impl CaptureHandle {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Stop forwarding frames. Idempotent; the device itself is released
    /// when the owning [`CaptureNode`] is dropped.
    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

// ── CaptureNode ───────────────────────────────────────────────

/// Owns the cpal input stream. Exclusive hold on the OS input device for
/// the lifetime of this value.
pub struct CaptureNode {
    _stream: Stream,
}

impl CaptureNode {
    pub fn new(
        device: &Device,
        frames: mpsc::UnboundedSender<CaptureItem>,
        sample_rate: u32,
        channels: u16,
        buffer_size: u32,
    ) -> Result<(Self, CaptureHandle), AudioError> {
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(buffer_size),
        };

        let open = Arc::new(AtomicBool::new(true));
        let open_flag = Arc::clone(&open);
        let open_err = Arc::clone(&open);
        let err_frames = frames.clone();

        // A device error ends the capture stream: close the handle so the
        // data callback stops forwarding, and report the error once through
        // the frame channel, after any frames already delivered.
        let err_callback = move |err: cpal::StreamError| {
            tracing::error!("capture stream error: {}", err);
            if open_err.swap(false, Ordering::Relaxed) {
                let _ = err_frames.send(Err(AudioError::StreamError(err.to_string())));
            }
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if !open_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let frame = AudioFrame::new(data.to_vec(), sample_rate, channels);
                    // Receiver gone means the pipeline is shutting down
                    let _ = frames.send(Ok(frame));
                },
                err_callback,
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    AudioError::DeviceUnavailable("input device not available".to_string())
                }
                other => AudioError::StreamBuild(other.to_string()),
            })?;

        let handle = CaptureHandle { open };
        Ok((Self { _stream: stream }, handle))
    }
}
