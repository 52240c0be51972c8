//! Connector model: device channels and private process buffers.
//!
//! Connectors are addressed by engine-tagged arena handles. A handle is
//! validated by looking it up in the owning engine's tables, so forged,
//! foreign and stale handles are all rejected at the boundary.

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::arena::{Arena, ArenaKey};
use crate::error::{BindingError, RegisterError, StreamError};
use crate::event_buf::EventBuffer;
use crate::invariant_ppt::{
    assert_invariant, BINDING_REJECTED_CLEAN, CHANNEL_OUTPUT_EXCLUSIVE, COUNTERS_BALANCED,
    PRODUCER_BEFORE_CONSUMER,
};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one engine. Every connector handle carries the id of the
/// engine that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    engine: EngineId,
    key: ArenaKey,
}

/// Handle to a process buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessBufferId {
    engine: EngineId,
    key: ArenaKey,
}

/// Anything a processor can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connector {
    Channel(ChannelId),
    ProcessBuffer(ProcessBufferId),
}

impl Connector {
    pub fn engine(&self) -> EngineId {
        match self {
            Connector::Channel(c) => c.engine,
            Connector::ProcessBuffer(b) => b.engine,
        }
    }
}

impl From<ChannelId> for Connector {
    fn from(id: ChannelId) -> Self {
        Connector::Channel(id)
    }
}

impl From<ProcessBufferId> for Connector {
    fn from(id: ProcessBufferId) -> Self {
        Connector::ProcessBuffer(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// Directions a connector can currently be bound in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directions {
    None,
    In,
    Out,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorType {
    Audio,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorClass {
    Channel,
    ProcessBuffer,
    None,
}

/// One requested connector binding of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub connector: Connector,
    pub direction: Direction,
    pub kind: ConnectorType,
}

impl Binding {
    pub fn audio_in(connector: impl Into<Connector>) -> Self {
        Self::new(connector, Direction::In, ConnectorType::Audio)
    }

    pub fn audio_out(connector: impl Into<Connector>) -> Self {
        Self::new(connector, Direction::Out, ConnectorType::Audio)
    }

    pub fn event_in(connector: impl Into<Connector>) -> Self {
        Self::new(connector, Direction::In, ConnectorType::Event)
    }

    pub fn event_out(connector: impl Into<Connector>) -> Self {
        Self::new(connector, Direction::Out, ConnectorType::Event)
    }

    pub fn new(connector: impl Into<Connector>, direction: Direction, kind: ConnectorType) -> Self {
        Self {
            connector: connector.into(),
            direction,
            kind,
        }
    }
}

/// Samples of an audio process buffer.
///
/// While a stream runs only the callback locks `samples`. The control side
/// reads `tap` instead: a copy the callback refreshes after every write or
/// clear, but only when it gets the lock without waiting.
pub(crate) struct AudioStorage {
    samples: RwLock<Box<[f32]>>,
    tap: Mutex<Box<[f32]>>,
    frames: usize,
}

impl AudioStorage {
    pub fn new(frames: usize) -> Self {
        Self {
            samples: RwLock::new(vec![0.0; frames].into_boxed_slice()),
            tap: Mutex::new(vec![0.0; frames].into_boxed_slice()),
            frames,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Mirror `samples` into the tap. False if a reader holds it.
    pub fn publish(&self, samples: &[f32]) -> bool {
        match self.tap.try_lock() {
            Some(mut tap) => {
                let n = tap.len().min(samples.len());
                tap[..n].copy_from_slice(&samples[..n]);
                true
            }
            None => false,
        }
    }

    /// Copy of the samples as of the callback's last publish.
    pub fn read_tap(&self) -> Vec<f32> {
        self.tap.lock().to_vec()
    }

    #[cfg(test)]
    pub(crate) fn lock_tap(&self) -> parking_lot::MutexGuard<'_, Box<[f32]>> {
        self.tap.lock()
    }

    #[cfg(test)]
    pub(crate) fn lock_samples(&self) -> RwLockReadGuard<'_, Box<[f32]>> {
        self.samples.read()
    }
}

/// Backing storage of a process buffer, shared with the callback.
pub(crate) enum BufferStorage {
    Audio(AudioStorage),
    Event(RwLock<EventBuffer>),
}

impl BufferStorage {
    pub fn kind(&self) -> ConnectorType {
        match self {
            BufferStorage::Audio(_) => ConnectorType::Audio,
            BufferStorage::Event(_) => ConnectorType::Event,
        }
    }

    /// First `nframes` samples for reading. `None` if the lock is taken,
    /// the buffer is too short, or it holds events.
    pub fn try_audio(&self, nframes: usize) -> Option<MappedRwLockReadGuard<'_, [f32]>> {
        match self {
            BufferStorage::Audio(audio) => {
                let guard = audio.samples.try_read()?;
                if guard.len() < nframes {
                    return None;
                }
                Some(RwLockReadGuard::map(guard, |b| &b[..nframes]))
            }
            BufferStorage::Event(_) => None,
        }
    }

    /// First `nframes` samples for writing, with the storage to publish
    /// them to once the write is done.
    pub fn try_audio_mut(
        &self,
        nframes: usize,
    ) -> Option<(MappedRwLockWriteGuard<'_, [f32]>, &AudioStorage)> {
        match self {
            BufferStorage::Audio(audio) => {
                let guard = audio.samples.try_write()?;
                if guard.len() < nframes {
                    return None;
                }
                Some((RwLockWriteGuard::map(guard, |b| &mut b[..nframes]), audio))
            }
            BufferStorage::Event(_) => None,
        }
    }

    pub fn try_events(&self) -> Option<RwLockReadGuard<'_, EventBuffer>> {
        match self {
            BufferStorage::Event(lock) => lock.try_read(),
            BufferStorage::Audio(_) => None,
        }
    }

    pub fn try_events_mut(&self) -> Option<RwLockWriteGuard<'_, EventBuffer>> {
        match self {
            BufferStorage::Event(lock) => lock.try_write(),
            BufferStorage::Audio(_) => None,
        }
    }

    /// Zero audio (and its tap) or drop events. False if any lock was
    /// taken; the caller retries on a later cycle.
    pub fn try_clear(&self, nframes: usize) -> bool {
        match self {
            BufferStorage::Audio(audio) => match audio.samples.try_write() {
                Some(mut buf) => {
                    let n = nframes.min(buf.len());
                    buf[..n].fill(0.0);
                    audio.publish(&buf)
                }
                None => false,
            },
            BufferStorage::Event(lock) => match lock.try_write() {
                Some(mut events) => {
                    events.reset();
                    true
                }
                None => false,
            },
        }
    }
}

#[derive(Debug)]
pub(crate) struct Channel {
    pub direction: Direction,
    /// 1-based device channel.
    pub index: u32,
    /// 0-based lane in the non-interleaved device buffer.
    pub lane: usize,
    pub usage: usize,
}

pub(crate) struct ProcessBuffer {
    pub storage: Arc<BufferStorage>,
    pub usage: usize,
    pub input_usage: usize,
    pub output_usage: usize,
    pub input_active: usize,
    pub output_active: usize,
}

/// Usage and activity counters of one process buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCounters {
    pub usage: usize,
    pub input_usage: usize,
    pub output_usage: usize,
    pub input_active: usize,
    pub output_active: usize,
}

/// Where a bound connector's samples live during a cycle.
pub(crate) enum BoundTarget {
    Lane(usize),
    Buffer(Arc<BufferStorage>),
}

/// A validated binding, as stored in a registration.
pub(crate) struct BoundConnector {
    pub connector: Connector,
    pub direction: Direction,
    pub kind: ConnectorType,
    pub target: BoundTarget,
}

/// All connectors of one engine.
pub(crate) struct ConnectorTable {
    engine: EngineId,
    channels: Arena<Channel>,
    buffers: Arena<ProcessBuffer>,
    inputs: Vec<ChannelId>,
    outputs: Vec<ChannelId>,
}

impl ConnectorTable {
    pub fn new(engine: EngineId) -> Self {
        Self {
            engine,
            channels: Arena::new(),
            buffers: Arena::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_channel(&mut self, direction: Direction, index: u32, lane: usize) -> ChannelId {
        let key = self.channels.insert(Channel {
            direction,
            index,
            lane,
            usage: 0,
        });
        let id = ChannelId {
            engine: self.engine,
            key,
        };
        match direction {
            Direction::In => self.inputs.push(id),
            Direction::Out => self.outputs.push(id),
        }
        id
    }

    pub fn inputs(&self) -> &[ChannelId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ChannelId] {
        &self.outputs
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        if id.engine != self.engine {
            return None;
        }
        self.channels.get(id.key)
    }

    pub fn new_buffer(&mut self, kind: ConnectorType, frames: usize, event_bytes: usize) -> ProcessBufferId {
        let storage = match kind {
            ConnectorType::Audio => BufferStorage::Audio(AudioStorage::new(frames)),
            ConnectorType::Event => BufferStorage::Event(RwLock::new(EventBuffer::with_capacity(event_bytes))),
        };
        let key = self.buffers.insert(ProcessBuffer {
            storage: Arc::new(storage),
            usage: 0,
            input_usage: 0,
            output_usage: 0,
            input_active: 0,
            output_active: 0,
        });
        ProcessBufferId {
            engine: self.engine,
            key,
        }
    }

    fn buffer(&self, id: ProcessBufferId) -> Option<&ProcessBuffer> {
        if id.engine != self.engine {
            return None;
        }
        self.buffers.get(id.key)
    }

    pub fn buffer_storage(&self, id: ProcessBufferId) -> Option<&Arc<BufferStorage>> {
        self.buffer(id).map(|b| &b.storage)
    }

    pub fn buffer_counters(&self, id: ProcessBufferId) -> Option<BufferCounters> {
        self.buffer(id).map(|b| BufferCounters {
            usage: b.usage,
            input_usage: b.input_usage,
            output_usage: b.output_usage,
            input_active: b.input_active,
            output_active: b.output_active,
        })
    }

    /// Release a process buffer nobody is bound to.
    pub fn remove_buffer(&mut self, id: ProcessBufferId) -> Result<(), StreamError> {
        let buf = self.buffer(id).ok_or(StreamError::InvalidConnector)?;
        if buf.usage > 0 {
            return Err(StreamError::BufferInUse);
        }
        self.buffers.remove(id.key);
        Ok(())
    }

    /// Stream closed: every channel handle goes stale. Process buffers
    /// belong to the engine and survive.
    pub fn invalidate(&mut self) {
        self.channels.clear();
        self.inputs.clear();
        self.outputs.clear();
    }

    /// Give unbound audio buffers `frames` samples after a stream reopened
    /// with another buffer size. Bound buffers are left alone.
    pub fn resize_audio(&mut self, frames: usize) {
        for (_, buf) in self.buffers.iter_mut() {
            if buf.usage > 0 {
                continue;
            }
            if let BufferStorage::Audio(audio) = &*buf.storage {
                if audio.frames() != frames {
                    buf.storage = Arc::new(BufferStorage::Audio(AudioStorage::new(frames)));
                }
            }
        }
    }

    pub fn classify(&self, connector: Connector) -> ConnectorClass {
        match connector {
            Connector::Channel(id) if self.channel(id).is_some() => ConnectorClass::Channel,
            Connector::ProcessBuffer(id) if self.buffer(id).is_some() => ConnectorClass::ProcessBuffer,
            _ => ConnectorClass::None,
        }
    }

    pub fn connector_type(&self, connector: Connector) -> Option<ConnectorType> {
        match connector {
            Connector::Channel(id) => self.channel(id).map(|_| ConnectorType::Audio),
            Connector::ProcessBuffer(id) => self.buffer(id).map(|b| b.storage.kind()),
        }
    }

    pub fn directions(&self, connector: Connector) -> Directions {
        match connector {
            Connector::Channel(id) => match self.channel(id) {
                Some(ch) if ch.direction == Direction::In => Directions::In,
                Some(ch) if ch.usage == 0 => Directions::Out,
                _ => Directions::None,
            },
            Connector::ProcessBuffer(id) => match self.buffer(id) {
                Some(b) if b.output_usage == 0 => Directions::Out,
                Some(_) => Directions::In,
                None => Directions::None,
            },
        }
    }

    /// Check one binding against the current counters.
    pub fn validate(&self, binding: &Binding) -> Result<(), BindingError> {
        if binding.connector.engine() != self.engine {
            return Err(BindingError::EngineMismatch);
        }
        match binding.connector {
            Connector::Channel(id) => {
                let ch = self.channels.get(id.key).ok_or(BindingError::Invalid)?;
                let direction_ok = match binding.direction {
                    Direction::In => ch.direction == Direction::In,
                    Direction::Out => ch.direction == Direction::Out && ch.usage == 0,
                };
                if !direction_ok {
                    return Err(BindingError::WrongDirection);
                }
                if binding.kind != ConnectorType::Audio {
                    return Err(BindingError::WrongConnectorType);
                }
            }
            Connector::ProcessBuffer(id) => {
                let buf = self.buffers.get(id.key).ok_or(BindingError::Invalid)?;
                let direction_ok = match binding.direction {
                    Direction::In => buf.output_usage > 0,
                    Direction::Out => buf.output_usage == 0,
                };
                if !direction_ok {
                    return Err(BindingError::WrongDirection);
                }
                if binding.kind != buf.storage.kind() {
                    return Err(BindingError::WrongConnectorType);
                }
            }
        }
        Ok(())
    }

    /// Validate a whole request. An output connector may appear only once.
    pub fn validate_all(&self, bindings: &[Binding]) -> Result<(), RegisterError> {
        for (index, binding) in bindings.iter().enumerate() {
            let fail = |kind| RegisterError::Binding { index, kind };
            self.validate(binding).map_err(fail)?;
            if binding.direction == Direction::Out
                && bindings[..index]
                    .iter()
                    .any(|b| b.direction == Direction::Out && b.connector == binding.connector)
            {
                return Err(fail(BindingError::WrongDirection));
            }
        }
        Ok(())
    }

    /// Resolve validated bindings into their runtime targets.
    /// Allocation failure leaves nothing behind.
    pub fn bind(&self, bindings: &[Binding]) -> Result<Box<[BoundConnector]>, RegisterError> {
        let before = self.usage_total();
        if let Err(err) = self.validate_all(bindings) {
            assert_invariant(
                BINDING_REJECTED_CLEAN,
                self.usage_total() == before,
                "rejected binding must not touch counters",
                None,
            );
            return Err(err);
        }
        let mut bound = Vec::new();
        bound
            .try_reserve_exact(bindings.len())
            .map_err(|_| RegisterError::ResourceExhausted)?;
        for binding in bindings {
            let target = match binding.connector {
                Connector::Channel(id) => {
                    let ch = self.channels.get(id.key).ok_or(RegisterError::Binding {
                        index: bound.len(),
                        kind: BindingError::Invalid,
                    })?;
                    BoundTarget::Lane(ch.lane)
                }
                Connector::ProcessBuffer(id) => {
                    let buf = self.buffers.get(id.key).ok_or(RegisterError::Binding {
                        index: bound.len(),
                        kind: BindingError::Invalid,
                    })?;
                    BoundTarget::Buffer(Arc::clone(&buf.storage))
                }
            };
            bound.push(BoundConnector {
                connector: binding.connector,
                direction: binding.direction,
                kind: binding.kind,
                target,
            });
        }
        Ok(bound.into_boxed_slice())
    }

    /// Count a committed registration's bindings.
    pub fn claim(&mut self, bound: &[BoundConnector]) {
        for b in bound {
            match b.connector {
                Connector::Channel(id) => {
                    if let Some(ch) = self.channels.get_mut(id.key) {
                        assert_invariant(
                            CHANNEL_OUTPUT_EXCLUSIVE,
                            b.direction == Direction::In || ch.usage == 0,
                            "output channel claimed while in use",
                            None,
                        );
                        ch.usage += 1;
                    }
                }
                Connector::ProcessBuffer(id) => {
                    if let Some(buf) = self.buffers.get_mut(id.key) {
                        buf.usage += 1;
                        match b.direction {
                            Direction::In => {
                                assert_invariant(
                                    PRODUCER_BEFORE_CONSUMER,
                                    buf.output_usage > 0,
                                    "process buffer consumed before it has a producer",
                                    None,
                                );
                                buf.input_usage += 1;
                            }
                            Direction::Out => buf.output_usage += 1,
                        }
                    }
                }
            }
        }
        self.check_balanced();
    }

    /// Undo [`claim`](Self::claim), including activity if the registration was active.
    pub fn release(&mut self, bound: &[BoundConnector], was_active: bool) {
        for b in bound {
            match b.connector {
                Connector::Channel(id) => {
                    if let Some(ch) = self.channels.get_mut(id.key) {
                        ch.usage = ch.usage.saturating_sub(1);
                    }
                }
                Connector::ProcessBuffer(id) => {
                    if let Some(buf) = self.buffers.get_mut(id.key) {
                        buf.usage = buf.usage.saturating_sub(1);
                        match b.direction {
                            Direction::In => {
                                buf.input_usage = buf.input_usage.saturating_sub(1);
                                if was_active {
                                    buf.input_active = buf.input_active.saturating_sub(1);
                                }
                            }
                            Direction::Out => {
                                buf.output_usage = buf.output_usage.saturating_sub(1);
                                if was_active {
                                    buf.output_active = buf.output_active.saturating_sub(1);
                                }
                            }
                        }
                    }
                }
            }
        }
        self.check_balanced();
    }

    /// Track activation of a registration on its process buffers.
    pub fn set_active(&mut self, bound: &[BoundConnector], active: bool) {
        for b in bound {
            if let Connector::ProcessBuffer(id) = b.connector {
                if let Some(buf) = self.buffers.get_mut(id.key) {
                    let counter = match b.direction {
                        Direction::In => &mut buf.input_active,
                        Direction::Out => &mut buf.output_active,
                    };
                    if active {
                        *counter += 1;
                    } else {
                        *counter = counter.saturating_sub(1);
                    }
                }
            }
        }
        self.check_balanced();
    }

    /// Index of the first output binding whose buffer still has consumers.
    pub fn output_consumed(&self, bound: &[BoundConnector]) -> Option<usize> {
        bound.iter().position(|b| match (b.direction, b.connector) {
            (Direction::Out, Connector::ProcessBuffer(id)) => {
                self.buffers.get(id.key).is_some_and(|buf| buf.input_usage > 0)
            }
            _ => false,
        })
    }

    fn usage_total(&self) -> usize {
        let channels: usize = self.channels.iter().map(|(_, c)| c.usage).sum();
        let buffers: usize = self.buffers.iter().map(|(_, b)| b.usage).sum();
        channels + buffers
    }

    fn check_balanced(&self) {
        for (_, buf) in self.buffers.iter() {
            assert_invariant(
                COUNTERS_BALANCED,
                buf.usage == buf.input_usage + buf.output_usage
                    && buf.input_active <= buf.input_usage
                    && buf.output_active <= buf.output_usage
                    && buf.output_usage <= 1,
                "process buffer counters out of balance",
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ConnectorTable {
        ConnectorTable::new(EngineId::next())
    }

    #[test]
    fn input_channel_only_binds_in() {
        let mut t = table();
        let ch = t.add_channel(Direction::In, 1, 0);
        assert_eq!(t.directions(ch.into()), Directions::In);
        assert_eq!(t.validate(&Binding::audio_in(ch)), Ok(()));
        assert_eq!(t.validate(&Binding::audio_out(ch)), Err(BindingError::WrongDirection));
    }

    #[test]
    fn channel_rejects_event_binding() {
        let mut t = table();
        let ch = t.add_channel(Direction::Out, 1, 0);
        assert_eq!(t.validate(&Binding::event_out(ch)), Err(BindingError::WrongConnectorType));
    }

    #[test]
    fn foreign_handle_is_engine_mismatch() {
        let mut a = table();
        let b = table();
        let ch = a.add_channel(Direction::Out, 1, 0);
        assert_eq!(b.validate(&Binding::audio_out(ch)), Err(BindingError::EngineMismatch));
        assert_eq!(b.classify(ch.into()), ConnectorClass::None);
    }

    #[test]
    fn buffers_survive_invalidate_and_resize_when_unbound() {
        let mut t = table();
        let idle = t.new_buffer(ConnectorType::Audio, 64, 0);
        let bound = t.new_buffer(ConnectorType::Audio, 64, 0);
        let claim = t.bind(&[Binding::audio_out(bound)]).unwrap();
        t.claim(&claim);
        t.invalidate();
        assert_eq!(t.classify(idle.into()), ConnectorClass::ProcessBuffer);
        t.resize_audio(128);
        assert!(t.buffer_storage(idle).unwrap().try_audio(128).is_some());
        assert!(t.buffer_storage(bound).unwrap().try_audio(128).is_none());
    }

    #[test]
    fn stale_handle_is_invalid() {
        let mut t = table();
        let ch = t.add_channel(Direction::Out, 1, 0);
        t.invalidate();
        assert_eq!(t.validate(&Binding::audio_out(ch)), Err(BindingError::Invalid));
        assert_eq!(t.connector_type(ch.into()), None);
        assert_eq!(t.directions(ch.into()), Directions::None);
    }

    #[test]
    fn duplicate_output_in_one_request_rejected() {
        let mut t = table();
        let ch = t.add_channel(Direction::Out, 1, 0);
        let err = t
            .validate_all(&[Binding::audio_out(ch), Binding::audio_out(ch)])
            .unwrap_err();
        assert_eq!(err.connector_index(), Some(1));
    }

    #[test]
    fn buffer_directions_follow_producer() {
        let mut t = table();
        let buf = t.new_buffer(ConnectorType::Audio, 64, 0);
        assert_eq!(t.directions(buf.into()), Directions::Out);
        let bound = t.bind(&[Binding::audio_out(buf)]).unwrap();
        t.claim(&bound);
        assert_eq!(t.directions(buf.into()), Directions::In);
        t.set_active(&bound, true);
        assert_eq!(t.buffer_counters(buf).unwrap().output_active, 1);
        t.release(&bound, true);
        assert_eq!(t.buffer_counters(buf).unwrap(), BufferCounters::default());
    }

    #[test]
    fn buffer_in_use_cannot_be_removed() {
        let mut t = table();
        let buf = t.new_buffer(ConnectorType::Event, 0, 128);
        let bound = t.bind(&[Binding::event_out(buf)]).unwrap();
        t.claim(&bound);
        assert_eq!(t.remove_buffer(buf), Err(StreamError::BufferInUse));
        t.release(&bound, false);
        assert_eq!(t.remove_buffer(buf), Ok(()));
        assert_eq!(t.remove_buffer(buf), Err(StreamError::InvalidConnector));
    }

    #[test]
    fn storage_accessors_respect_kind_and_length() {
        let storage = BufferStorage::Audio(AudioStorage::new(8));
        if let Some((mut samples, _)) = storage.try_audio_mut(8) {
            samples.fill(1.0);
        }
        assert!(storage.try_audio(16).is_none());
        assert_eq!(storage.try_audio(4).unwrap().len(), 4);
        assert!(storage.try_events().is_none());
        assert!(storage.try_clear(8));
        assert!(storage.try_audio(8).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn clear_reports_contended_tap() {
        let storage = BufferStorage::Audio(AudioStorage::new(4));
        let BufferStorage::Audio(audio) = &storage else {
            unreachable!()
        };
        assert!(audio.publish(&[0.5; 4]));
        assert_eq!(audio.read_tap(), vec![0.5; 4]);
        {
            let _reader = audio.lock_tap();
            assert!(!storage.try_clear(4));
        }
        assert!(storage.try_clear(4));
        assert_eq!(audio.read_tap(), vec![0.0; 4]);
    }
}
