//! Engine: stream lifecycle and the control-path API.
//!
//! Control operations are serialized by one mutex. Every entry point first
//! checks whether the callback requested a shutdown and, if so, closes the
//! stream before doing anything else.

use parking_lot::Mutex;
use rtrb::Consumer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::callback::StreamCallback;
use crate::config::StreamConfig;
use crate::connector::{
    Binding, BufferCounters, BufferStorage, ChannelId, Connector, ConnectorClass, ConnectorTable,
    ConnectorType, Direction, Directions, EngineId, ProcessBufferId,
};
use crate::device::{AudioBackend, NegotiatedStream};
use crate::error::{DeviceError, RegisterError, StreamError, UnregisterError};
use crate::handoff::Handoff;
use crate::invariant_ppt::{assert_invariant, SEVERE_CLOSE_STICKY};
use crate::invariant_rt::{drain_invariant_signals, new_invariant_queue};
use crate::processor::{Processor, ProcessorHandle, ProcessorInfo};
use crate::registry::{Registry, Session};
use crate::status::StatusSink;

/// State shared between the control path and the callback of one stream.
pub(crate) struct StreamShared {
    pub handoff: Handoff,
    /// Frame time at the start of the current cycle.
    pub frame_time: AtomicU64,
    pub status_sink: Option<Arc<dyn StatusSink>>,
}

/// Snapshot of stream parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub name: Option<String>,
    pub sample_rate: u32,
    pub buffer_frames: u32,
    pub input_channels: usize,
    pub output_channels: usize,
    pub open: bool,
    pub running: bool,
    pub processors: usize,
}

struct StreamState {
    shared: Arc<StreamShared>,
    config: StreamConfig,
    negotiated: NegotiatedStream,
    open: bool,
    running: bool,
    signals: Consumer<u8>,
}

struct ControlState {
    backend: Box<dyn AudioBackend>,
    connectors: ConnectorTable,
    registry: Registry,
    stream: Option<StreamState>,
}

impl ControlState {
    fn handle_shutdown(&mut self) {
        let pending = self
            .stream
            .as_ref()
            .is_some_and(|s| s.open && s.shared.handoff.is_shutdown());
        if pending {
            self.close_locked();
        }
    }

    fn check_not_closed(&mut self) -> Result<(), StreamError> {
        self.handle_shutdown();
        match &self.stream {
            None => Err(StreamError::NoStream),
            Some(s) if !s.open => {
                if s.shared.handoff.is_severe() {
                    Err(StreamError::ClosedBySevereError)
                } else {
                    Err(StreamError::Closed)
                }
            }
            Some(_) => Ok(()),
        }
    }

    fn check_exists(&mut self) -> Result<(), StreamError> {
        self.handle_shutdown();
        self.stream.as_ref().map(|_| ()).ok_or(StreamError::NoStream)
    }

    fn stream(&self) -> Result<&StreamState, StreamError> {
        self.stream.as_ref().ok_or(StreamError::NoStream)
    }

    fn parts(&mut self) -> Result<(&mut Registry, Session<'_>), StreamError> {
        let stream = self.stream.as_ref().ok_or(StreamError::NoStream)?;
        Ok((
            &mut self.registry,
            Session {
                connectors: &mut self.connectors,
                handoff: &stream.shared.handoff,
                running: stream.running,
                buffer_frames: stream.negotiated.buffer_frames,
            },
        ))
    }

    fn close_locked(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if !stream.open {
            return;
        }
        if stream.running {
            if let Err(err) = self.backend.stop() {
                log::warn!("failed to stop stream while closing: {}", err);
            }
            stream.running = false;
        }
        stream
            .shared
            .handoff
            .publish(self.registry.empty_snapshot(), false);
        self.backend.close();
        stream.open = false;
        self.connectors.invalidate();

        let severe = stream.shared.handoff.is_severe();
        for reg in self.registry.current().entries.iter() {
            reg.processor.lock().engine_closed();
        }
        if severe {
            log::error!("stream closed after severe processing error");
        } else {
            log::info!("stream closed");
        }
    }

    fn release_locked(&mut self) {
        self.close_locked();
        if self.stream.take().is_some() {
            for reg in self.registry.release_all() {
                self.connectors.release(&reg.bindings, reg.is_activated());
                reg.processor.lock().engine_released();
            }
        }
    }
}

/// A live audio session around one [`AudioBackend`].
pub struct Engine {
    id: EngineId,
    state: Mutex<ControlState>,
    status_sink: Option<Arc<dyn StatusSink>>,
}

impl Engine {
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        let id = EngineId::next();
        Self {
            id,
            state: Mutex::new(ControlState {
                backend: Box::new(backend),
                connectors: ConnectorTable::new(id),
                registry: Registry::new(id),
                stream: None,
            }),
            status_sink: None,
        }
    }

    /// Route fatal processing errors of future streams to `sink`.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Open a device stream. A previously closed stream is released first,
    /// which discards its registrations.
    pub fn open_stream(&self, config: StreamConfig) -> Result<(), StreamError> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        if st.stream.as_ref().is_some_and(|s| s.open) {
            return Err(StreamError::AlreadyOpen);
        }
        config.validate()?;
        st.release_locked();

        let shared = Arc::new(StreamShared {
            handoff: Handoff::new(Arc::clone(st.registry.current())),
            frame_time: AtomicU64::new(0),
            status_sink: self.status_sink.clone(),
        });
        let (tx, rx) = new_invariant_queue();
        let callback = StreamCallback::new(Arc::clone(&shared), tx);
        let negotiated = st.backend.open(&config, callback)?;
        if negotiated.buffer_frames == 0 {
            st.backend.close();
            return Err(DeviceError::ZeroBufferFrames.into());
        }

        for k in 0..config.input_channels {
            st.connectors
                .add_channel(Direction::In, config.first_input_channel + k, k as usize);
        }
        for k in 0..config.output_channels {
            st.connectors
                .add_channel(Direction::Out, config.first_output_channel + k, k as usize);
        }
        st.connectors.resize_audio(negotiated.buffer_frames as usize);
        log::info!(
            "opened stream {}: {} Hz, {} frames, {} in, {} out",
            config.stream_name.as_deref().unwrap_or("<unnamed>"),
            negotiated.sample_rate,
            negotiated.buffer_frames,
            config.input_channels,
            config.output_channels
        );
        st.stream = Some(StreamState {
            shared,
            config,
            negotiated,
            open: true,
            running: false,
            signals: rx,
        });
        Ok(())
    }

    pub fn start_stream(&self) -> Result<(), StreamError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        let ControlState { backend, stream, .. } = &mut *st;
        let stream = stream.as_mut().ok_or(StreamError::NoStream)?;
        if stream.running {
            return Ok(());
        }
        stream.running = true;
        if let Err(err) = backend.start() {
            stream.running = false;
            return Err(err.into());
        }
        log::debug!("stream started");
        Ok(())
    }

    pub fn stop_stream(&self) -> Result<(), StreamError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        let ControlState { backend, stream, .. } = &mut *st;
        let stream = stream.as_mut().ok_or(StreamError::NoStream)?;
        if !stream.running {
            return Ok(());
        }
        backend.stop()?;
        stream.running = false;
        log::debug!("stream stopped");
        Ok(())
    }

    /// Close the stream. Channel handles become invalid; process buffers
    /// and registrations stay until the stream is released or reopened.
    pub fn close_stream(&self) {
        self.state.lock().close_locked();
    }

    pub fn is_closed(&self) -> bool {
        let mut st = self.state.lock();
        st.handle_shutdown();
        !st.stream.as_ref().is_some_and(|s| s.open)
    }

    /// Fails with the reason the stream is not usable, if it is not.
    pub fn check_not_closed(&self) -> Result<(), StreamError> {
        let result = self.state.lock().check_not_closed();
        if result == Err(StreamError::ClosedBySevereError) {
            assert_invariant(
                SEVERE_CLOSE_STICKY,
                self.is_closed(),
                "severe close must keep the stream closed",
                None,
            );
        }
        result
    }

    pub fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut st = self.state.lock();
        st.check_exists()?;
        let s = st.stream()?;
        Ok(StreamInfo {
            name: s.config.stream_name.clone(),
            sample_rate: s.negotiated.sample_rate,
            buffer_frames: s.negotiated.buffer_frames,
            input_channels: st.connectors.inputs().len(),
            output_channels: st.connectors.outputs().len(),
            open: s.open,
            running: s.running,
            processors: st.registry.len(),
        })
    }

    /// Frame time at the start of the current (or next) callback cycle.
    /// Readable after the stream closed, until it is released.
    pub fn current_frame_time(&self) -> Result<u64, StreamError> {
        let mut st = self.state.lock();
        st.check_exists()?;
        Ok(st.stream()?.shared.frame_time.load(Ordering::Acquire))
    }

    /// Frame time at the end of the current cycle.
    pub fn frame_time(&self) -> Result<u64, StreamError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        let s = st.stream()?;
        Ok(s.shared.frame_time.load(Ordering::Acquire) + u64::from(s.negotiated.buffer_frames))
    }

    pub fn input_channels(&self) -> Result<Vec<ChannelId>, StreamError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        Ok(st.connectors.inputs().to_vec())
    }

    pub fn output_channels(&self) -> Result<Vec<ChannelId>, StreamError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        Ok(st.connectors.outputs().to_vec())
    }

    /// Input channel by 0-based lane.
    pub fn input_channel(&self, lane: usize) -> Result<ChannelId, StreamError> {
        self.input_channels()?
            .get(lane)
            .copied()
            .ok_or(StreamError::InvalidConnector)
    }

    /// Output channel by 0-based lane.
    pub fn output_channel(&self, lane: usize) -> Result<ChannelId, StreamError> {
        self.output_channels()?
            .get(lane)
            .copied()
            .ok_or(StreamError::InvalidConnector)
    }

    /// 1-based device channel number.
    pub fn channel_number(&self, id: ChannelId) -> Option<u32> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.connectors.channel(id).map(|c| c.index)
    }

    pub fn new_process_buffer(&self, kind: ConnectorType) -> Result<ProcessBufferId, StreamError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        let (frames, event_bytes) = {
            let s = st.stream()?;
            (s.negotiated.buffer_frames as usize, s.config.event_buffer_bytes)
        };
        Ok(st.connectors.new_buffer(kind, frames, event_bytes))
    }

    pub fn release_process_buffer(&self, id: ProcessBufferId) -> Result<(), StreamError> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.connectors.remove_buffer(id)
    }

    /// Copy of an audio process buffer's samples as of the callback's last
    /// write or clear. It may lag the working samples by a cycle.
    pub fn read_audio_buffer(&self, id: ProcessBufferId) -> Result<Vec<f32>, StreamError> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        let storage = st
            .connectors
            .buffer_storage(id)
            .ok_or(StreamError::InvalidConnector)?;
        match &**storage {
            BufferStorage::Audio(audio) => Ok(audio.read_tap()),
            BufferStorage::Event(_) => Err(StreamError::NotAudio),
        }
    }

    pub fn buffer_counters(&self, id: ProcessBufferId) -> Option<BufferCounters> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.connectors.buffer_counters(id)
    }

    pub fn classify(&self, connector: Connector) -> ConnectorClass {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.connectors.classify(connector)
    }

    pub fn connector_type(&self, connector: Connector) -> Option<ConnectorType> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.connectors.connector_type(connector)
    }

    pub fn available_directions(&self, connector: Connector) -> Directions {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.connectors.directions(connector)
    }

    /// Register `processor` with its connector bindings. On a binding error
    /// the failing index is reported and nothing changes. While the stream
    /// runs this returns once the callback has picked up the new list.
    pub fn register_processor(
        &self,
        name: &str,
        processor: impl Processor,
        bindings: &[Binding],
    ) -> Result<ProcessorHandle, RegisterError> {
        let mut st = self.state.lock();
        st.check_not_closed()?;
        let (registry, session) = st.parts()?;
        registry.register(session, name, Box::new(processor), bindings)
    }

    /// Remove a registration. Refused while another processor still reads
    /// one of its output buffers.
    pub fn unregister_processor(&self, handle: ProcessorHandle) -> Result<(), UnregisterError> {
        let mut st = self.state.lock();
        st.check_exists()?;
        let (registry, session) = st.parts()?;
        let reg = registry.unregister(session, handle)?;
        drop(st);
        drop(reg);
        Ok(())
    }

    pub fn activate_processor(&self, handle: ProcessorHandle) -> Result<(), StreamError> {
        self.set_active(handle, true)
    }

    pub fn deactivate_processor(&self, handle: ProcessorHandle) -> Result<(), StreamError> {
        self.set_active(handle, false)
    }

    fn set_active(&self, handle: ProcessorHandle, active: bool) -> Result<(), StreamError> {
        let mut st = self.state.lock();
        st.check_exists()?;
        let ControlState {
            registry,
            connectors,
            ..
        } = &mut *st;
        if registry.set_active(connectors, handle, active)? {
            log::debug!(
                "processor #{} {}",
                handle.serial,
                if active { "activated" } else { "deactivated" }
            );
        }
        Ok(())
    }

    pub fn processor_info(&self, handle: ProcessorHandle) -> Result<ProcessorInfo, StreamError> {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.registry
            .find(handle)
            .map(|r| r.info())
            .ok_or(StreamError::NotRegistered)
    }

    pub fn processor_count(&self) -> usize {
        let mut st = self.state.lock();
        st.handle_shutdown();
        st.registry.len()
    }

    /// Collect the callback's invariant signals since the last drain.
    pub fn drain_invariant_signals(&self) -> Vec<u8> {
        let mut st = self.state.lock();
        match st.stream.as_mut() {
            Some(s) => drain_invariant_signals(&mut s.signals),
            None => Vec::new(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.state.get_mut().release_locked();
    }
}
