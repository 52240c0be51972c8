//! Error types

use thiserror::Error;

/// Stream lifecycle and connector errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("no stream")]
    NoStream,

    #[error("stream is closed")]
    Closed,

    #[error("stream was closed because of severe processing error")]
    ClosedBySevereError,

    #[error("stream is already open")]
    AlreadyOpen,

    #[error("processor is not registered")]
    NotRegistered,

    #[error("process buffer is still bound to a registered processor")]
    BufferInUse,

    #[error("invalid connector")]
    InvalidConnector,

    #[error("connector is not an audio buffer")]
    NotAudio,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Why a single connector binding was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingError {
    #[error("invalid connector handle")]
    Invalid,

    #[error("connector belongs to another engine")]
    EngineMismatch,

    #[error("connector is not available in the requested direction")]
    WrongDirection,

    #[error("connector has the wrong type")]
    WrongConnectorType,
}

/// Errors returned by processor registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("invalid call: {0}")]
    CallInvalid(&'static str),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("connector #{index}: {kind}")]
    Binding { index: usize, kind: BindingError },

    #[error("processor '{processor}' rejected buffer size {frames} (code {code})")]
    SetupRejected {
        processor: String,
        frames: u32,
        code: i32,
    },

    #[error("out of memory while building processor list")]
    ResourceExhausted,
}

impl RegisterError {
    /// Index of the failing connector, for binding errors.
    pub fn connector_index(&self) -> Option<usize> {
        match self {
            RegisterError::Binding { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Unregistration refused because a consumer still reads an output buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnregisterError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("connector #{index}: process buffer is still used as input by other processors")]
    OutputInUse { index: usize },

    #[error("out of memory while building processor list")]
    ResourceExhausted,
}

/// Stream configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("stream needs at least one input or output channel")]
    NoChannels,

    #[error("first {direction} channel {first} is outside 1..={count}")]
    InvalidFirstChannel {
        direction: &'static str,
        first: u32,
        count: u32,
    },

    #[error("buffer size must be greater than zero")]
    ZeroBufferFrames,

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("failed to read config: {0}")]
    Io(String),
}

/// Errors reported by an audio backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("failed to open stream: {0}")]
    Open(String),

    #[error("failed to start stream: {0}")]
    Start(String),

    #[error("failed to stop stream: {0}")]
    Stop(String),

    #[error("backend negotiated a zero buffer size")]
    ZeroBufferFrames,
}

pub type StreamResult<T> = Result<T, StreamError>;
