//! Processor trait and registration records.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::connector::{BoundConnector, EngineId};
use crate::scope::ProcessScope;

/// A unit of work driven by the stream callback.
///
/// `process` runs on the real-time thread: it must not block or allocate.
/// A non-zero error code is fatal for the stream.
pub trait Processor: Send + 'static {
    fn process(&mut self, scope: &ProcessScope<'_>) -> Result<(), i32>;

    /// Called on the control thread at registration with the stream's
    /// buffer size. An error rejects the registration.
    fn buffer_size_changed(&mut self, _frames: u32) -> Result<(), i32> {
        Ok(())
    }

    /// The stream this processor was registered with has closed.
    fn engine_closed(&mut self) {}

    /// The registration is being discarded along with its stream.
    fn engine_released(&mut self) {}
}

/// Processor backed by a closure.
pub struct FnProcessor<F>(F);

/// Wrap a closure as a [`Processor`].
pub fn from_fn<F>(f: F) -> FnProcessor<F>
where
    F: FnMut(&ProcessScope<'_>) -> Result<(), i32> + Send + 'static,
{
    FnProcessor(f)
}

impl<F> Processor for FnProcessor<F>
where
    F: FnMut(&ProcessScope<'_>) -> Result<(), i32> + Send + 'static,
{
    fn process(&mut self, scope: &ProcessScope<'_>) -> Result<(), i32> {
        (self.0)(scope)
    }
}

/// Handle returned by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorHandle {
    pub(crate) engine: EngineId,
    pub(crate) serial: u64,
}

/// Control-side view of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorInfo {
    pub name: String,
    pub buffer_frames: u32,
    pub activated: bool,
    pub outputs_cleared: bool,
    pub connectors: usize,
}

/// One registered processor. Immutable after publication apart from the
/// two flags and the processor state behind its mutex.
pub(crate) struct ProcReg {
    pub serial: u64,
    pub name: String,
    pub processor: Mutex<Box<dyn Processor>>,
    pub bindings: Box<[BoundConnector]>,
    pub activated: AtomicBool,
    pub out_buffers_cleared: AtomicBool,
    pub buffer_frames: u32,
}

impl ProcReg {
    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    pub fn info(&self) -> ProcessorInfo {
        ProcessorInfo {
            name: self.name.clone(),
            buffer_frames: self.buffer_frames,
            activated: self.is_activated(),
            outputs_cleared: self.out_buffers_cleared.load(Ordering::Acquire),
            connectors: self.bindings.len(),
        }
    }
}
