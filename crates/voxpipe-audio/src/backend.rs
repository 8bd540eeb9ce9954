use crate::capture::{CaptureHandle, CaptureItem, CaptureNode};
use crate::device::{preferred_buffer_size, DeviceManager};
use crate::output::{FrameSink, OutputHandle, OutputNode};
use cpal::traits::DeviceTrait;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::sync::mpsc;
use voxpipe_core::{AudioError, AudioFrame, CHANNELS};

// ── Backend traits ────────────────────────────────────────────

/// Restartable microphone source. `start` acquires the device and returns
/// the item stream; a device failure mid-stream is delivered as the final
/// `Err` item. `stop` is idempotent, callable while frames are still being
/// produced, and releases the device before returning.
pub trait CaptureBackend: Send {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureItem>, AudioError>;
    fn stop(&mut self);
    fn is_capturing(&self) -> bool;
}

/// Write side of an open playback device.
pub trait FrameWriter: Send + Sync {
    fn write(&self, frame: &AudioFrame);
}

/// Restartable speaker sink. `open` acquires the device and returns a
/// non-blocking writer; `close` is idempotent and releases the device.
pub trait PlaybackBackend: Send {
    fn open(&mut self) -> Result<Arc<dyn FrameWriter>, AudioError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

impl FrameWriter for FrameSink {
    fn write(&self, frame: &AudioFrame) {
        FrameSink::write(self, frame);
    }
}

// ── CpalCapture ───────────────────────────────────────────────

struct CaptureWorker {
    handle: CaptureHandle,
    stop_tx: std_mpsc::Sender<()>,
    join: thread::JoinHandle<()>,
}

/// Microphone capture over cpal. The stream object is not `Send`, so a
/// dedicated thread owns it: the thread builds the stream, reports the
/// outcome back, then blocks until `stop` signals it to release the device.
pub struct CpalCapture {
    device_name: String,
    sample_rate: u32,
    buffer_size: Option<u32>,
    worker: Option<CaptureWorker>,
}

impl CpalCapture {
    pub fn new(device_name: &str, sample_rate: u32, buffer_size: Option<u32>) -> Self {
        Self {
            device_name: device_name.to_string(),
            sample_rate,
            buffer_size,
            worker: None,
        }
    }
}

impl CaptureBackend for CpalCapture {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureItem>, AudioError> {
        if self.worker.is_some() {
            return Err(AudioError::DeviceUnavailable(
                "capture already running".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let sample_rate = self.sample_rate;
        let buffer_override = self.buffer_size;

        let join = thread::spawn(move || {
            let built = (|| {
                let manager = DeviceManager::new();
                let device = manager.get_input_device(&device_name)?;
                let supported = device
                    .default_input_config()
                    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
                let buffer_size = buffer_override
                    .unwrap_or_else(|| preferred_buffer_size(supported.buffer_size(), sample_rate));
                CaptureNode::new(&device, frame_tx, sample_rate, CHANNELS, buffer_size)
            })();

            match built {
                Ok((node, handle)) => {
                    let _ = ready_tx.send(Ok(handle.clone()));
                    // Block here holding the device until stop() signals
                    let _ = stop_rx.recv();
                    handle.close();
                    drop(node);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(handle)) => {
                tracing::debug!(device = %self.device_name, "capture started");
                self.worker = Some(CaptureWorker {
                    handle,
                    stop_tx,
                    join,
                });
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => Err(AudioError::DeviceUnavailable(
                "capture thread terminated during startup".to_string(),
            )),
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Frames stop flowing immediately; the thread then drops the
            // stream, releasing the device.
            worker.handle.close();
            let _ = worker.stop_tx.send(());
            let _ = worker.join.join();
            tracing::debug!(device = %self.device_name, "capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── CpalPlayback ──────────────────────────────────────────────

struct PlaybackWorker {
    handle: OutputHandle,
    stop_tx: std_mpsc::Sender<()>,
    join: thread::JoinHandle<()>,
}

/// Speaker playback over cpal, same worker-thread ownership scheme as
/// [`CpalCapture`]. The ring buffer holds 2 seconds of audio.
pub struct CpalPlayback {
    device_name: String,
    sample_rate: u32,
    buffer_size: Option<u32>,
    worker: Option<PlaybackWorker>,
}

impl CpalPlayback {
    pub fn new(device_name: &str, sample_rate: u32, buffer_size: Option<u32>) -> Self {
        Self {
            device_name: device_name.to_string(),
            sample_rate,
            buffer_size,
            worker: None,
        }
    }
}

impl PlaybackBackend for CpalPlayback {
    fn open(&mut self) -> Result<Arc<dyn FrameWriter>, AudioError> {
        if self.worker.is_some() {
            return Err(AudioError::DeviceUnavailable(
                "playback already open".to_string(),
            ));
        }

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let sample_rate = self.sample_rate;
        let buffer_override = self.buffer_size;

        let join = thread::spawn(move || {
            let built = (|| {
                let manager = DeviceManager::new();
                let device = manager.get_output_device(&device_name)?;
                let supported = device
                    .default_output_config()
                    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
                let buffer_size = buffer_override
                    .unwrap_or_else(|| preferred_buffer_size(supported.buffer_size(), sample_rate));

                let ring_capacity = sample_rate as usize * CHANNELS as usize * 2;
                let (producer, consumer) = crate::create_ring_buffer(ring_capacity);
                let (node, handle) =
                    OutputNode::new(&device, consumer, sample_rate, CHANNELS, buffer_size)?;
                let sink: Arc<dyn FrameWriter> = Arc::new(FrameSink::new(producer));
                Ok::<_, AudioError>((node, handle, sink))
            })();

            match built {
                Ok((node, handle, sink)) => {
                    let _ = ready_tx.send(Ok((handle.clone(), sink)));
                    let _ = stop_rx.recv();
                    handle.close();
                    drop(node);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok((handle, sink))) => {
                tracing::debug!(device = %self.device_name, "playback opened");
                self.worker = Some(PlaybackWorker {
                    handle,
                    stop_tx,
                    join,
                });
                Ok(sink)
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => Err(AudioError::DeviceUnavailable(
                "playback thread terminated during startup".to_string(),
            )),
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.handle.close();
            let _ = worker.stop_tx.send(());
            let _ = worker.join.join();
            tracing::debug!(device = %self.device_name, "playback closed");
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}
