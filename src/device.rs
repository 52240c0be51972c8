//! Audio backend abstraction.
//!
//! A backend owns the physical device: it negotiates the format, owns the
//! sample buffers and calls [`StreamCallback::process`] once per cycle with
//! non-interleaved `f32` lanes.

use crate::callback::StreamCallback;
use crate::config::StreamConfig;
use crate::error::DeviceError;

/// Format the backend settled on when opening a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedStream {
    pub sample_rate: u32,
    pub buffer_frames: u32,
}

pub trait AudioBackend: Send {
    /// Open a stream and take ownership of its callback. Must not call
    /// back before [`start`](Self::start).
    fn open(&mut self, config: &StreamConfig, callback: StreamCallback) -> Result<NegotiatedStream, DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stop calling back. Returns once no cycle is in progress.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Drop the device stream and its callback.
    fn close(&mut self);
}
