//! Structured status notifications.
//!
//! The callback reports fatal processing errors to a [`StatusSink`]. Delivery
//! is best-effort: a failed delivery is logged and never changes stream state.

use crossbeam_channel::{Receiver, Sender, TrySendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    ProcessingError,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::ProcessingError => "ProcessingError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub message: String,
    pub processor: String,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("status receiver is gone")]
    Disconnected,
    #[error("status queue is full")]
    Full,
}

/// Fire-and-forget target for status notifications.
pub trait StatusSink: Send + Sync {
    fn deliver(&self, msg: StatusMessage) -> Result<(), SinkError>;
}

/// Bounded channel sink. `deliver` never blocks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<StatusMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    pub fn bounded(capacity: usize) -> (Self, Receiver<StatusMessage>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn deliver(&self, msg: StatusMessage) -> Result<(), SinkError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}
