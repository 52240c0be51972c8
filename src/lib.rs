//! Real-time audio stream kernel.
//!
//! An [`Engine`] wraps one audio backend. Processors register against its
//! device channels and private process buffers; the real-time callback
//! iterates an immutable snapshot of the registrations, and every registry
//! change is handed over without the callback ever blocking.

pub mod arena;
pub mod callback;
pub mod config;
pub mod connector;
pub mod device;
pub mod engine;
pub mod error;
pub mod event_buf;
mod handoff;
#[doc(hidden)]
pub mod harness;
#[doc(hidden)]
pub mod invariant_ppt;
#[doc(hidden)]
pub mod invariant_rt;
pub mod logging;
pub mod processor;
mod registry;
pub mod scope;
pub mod status;

pub use callback::StreamCallback;
pub use config::StreamConfig;
pub use connector::{
    Binding, BufferCounters, ChannelId, Connector, ConnectorClass, ConnectorType, Direction,
    Directions, EngineId, ProcessBufferId,
};
pub use device::{AudioBackend, NegotiatedStream};
pub use engine::{Engine, StreamInfo};
pub use error::{BindingError, ConfigError, DeviceError, RegisterError, StreamError, UnregisterError};
pub use event_buf::{Event, EventBuffer, NoData};
pub use processor::{from_fn, FnProcessor, Processor, ProcessorHandle, ProcessorInfo};
pub use scope::{AudioIn, AudioOut, ProcessScope};
pub use status::{ChannelSink, StatusKind, StatusMessage, StatusSink};
