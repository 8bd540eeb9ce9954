pub mod backend;
pub mod capture;
pub mod device;
pub mod output;

pub use backend::{CaptureBackend, CpalCapture, CpalPlayback, FrameWriter, PlaybackBackend};
pub use capture::{CaptureHandle, CaptureItem, CaptureNode};
pub use device::{preferred_buffer_size, DeviceManager};
pub use output::{FrameSink, OutputHandle, OutputNode};

use ringbuf::traits::Split;
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Create a playback ring buffer split into producer and consumer halves.
pub fn create_ring_buffer(capacity: usize) -> (HeapProd<i16>, HeapCons<i16>) {
    HeapRb::<i16>::new(capacity).split()
}
