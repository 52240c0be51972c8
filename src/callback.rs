//! Stream callback: the per-cycle loop run on the real-time thread.

// IMPORTANT: Do not call assert_invariant or any PPT logging in this module; it locks and allocates.

use rtrb::Producer;
use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::connector::{BoundTarget, Direction};
use crate::engine::StreamShared;
use crate::invariant_rt::{
    signal_invariant, INV_CONFIRM_DEFERRED, INV_CYCLE_SKIPPED, INV_OUTPUTS_CLEARED,
    INV_PROCESSOR_BUSY, INV_PROCESSOR_FAILED, INV_SNAPSHOT_CONFIRMED,
};
use crate::processor::ProcReg;
use crate::scope::ProcessScope;
use crate::status::{StatusKind, StatusMessage};

/// Entry point the audio backend calls once per device cycle.
///
/// Buffers are non-interleaved: lane `k` of `input`/`output` occupies
/// `[k * nframes, (k + 1) * nframes)`.
pub struct StreamCallback {
    shared: Arc<StreamShared>,
    last_confirmed: u64,
    signals: Producer<u8>,
}

impl StreamCallback {
    pub(crate) fn new(shared: Arc<StreamShared>, signals: Producer<u8>) -> Self {
        Self {
            shared,
            last_confirmed: u64::MAX,
            signals,
        }
    }

    /// Run one cycle. An error carries the failing processor's code; the
    /// stream is shut down by then.
    pub fn process(&mut self, nframes: u32, input: &[f32], output: &mut [f32]) -> Result<(), i32> {
        let handoff = &self.shared.handoff;
        let snapshot = handoff.load();

        if snapshot.epoch != self.last_confirmed {
            if handoff.try_confirm(snapshot.epoch) {
                self.last_confirmed = snapshot.epoch;
                signal_invariant(&mut self.signals, INV_SNAPSHOT_CONFIRMED);
            } else {
                signal_invariant(&mut self.signals, INV_CONFIRM_DEFERRED);
            }
        }

        let frames = nframes as usize;
        let frame_time = self.shared.frame_time.load(Ordering::Acquire);
        let mut result = Ok(());

        if handoff.is_shutdown() {
            signal_invariant(&mut self.signals, INV_CYCLE_SKIPPED);
        } else {
            let output = Cell::from_mut(output).as_slice_of_cells();
            for reg in snapshot.entries.iter() {
                if reg.is_activated() {
                    reg.out_buffers_cleared.store(false, Ordering::Release);
                    let Some(mut processor) = reg.processor.try_lock() else {
                        signal_invariant(&mut self.signals, INV_PROCESSOR_BUSY);
                        continue;
                    };
                    let scope = ProcessScope::new(frames, frame_time, &reg.bindings, input, output);
                    if let Err(code) = processor.process(&scope) {
                        drop(processor);
                        signal_invariant(&mut self.signals, INV_PROCESSOR_FAILED);
                        self.escalate(reg, code);
                        result = Err(code);
                        break;
                    }
                } else if !reg.out_buffers_cleared.load(Ordering::Acquire) {
                    if clear_outputs(reg, frames, output) {
                        reg.out_buffers_cleared.store(true, Ordering::Release);
                        signal_invariant(&mut self.signals, INV_OUTPUTS_CLEARED);
                    }
                }
            }
        }

        self.shared
            .frame_time
            .store(frame_time.wrapping_add(nframes as u64), Ordering::Release);
        result
    }

    /// The device failed underneath the stream. The next control call
    /// closes it.
    pub fn device_shutdown(&self) {
        log::warn!("audio device shut down the stream");
        self.shared.handoff.signal_shutdown(false);
    }

    /// Fatal processor error. The stream is dead after this, so the
    /// blocking lock and the allocations below are acceptable.
    #[cold]
    fn escalate(&self, reg: &ProcReg, code: i32) {
        self.shared.handoff.signal_shutdown(true);
        log::error!(
            "stream invalidated because processor '{}' returned processing error {}",
            reg.name,
            code
        );
        if let Some(sink) = &self.shared.status_sink {
            let msg = StatusMessage {
                kind: StatusKind::ProcessingError,
                message: "stream invalidated because processor returned processing error".to_owned(),
                processor: reg.name.clone(),
                code,
            };
            if let Err(err) = sink.deliver(msg) {
                log::warn!("could not deliver status message: {}", err);
            }
        }
    }
}

/// Zero a deactivated processor's outputs. False if a buffer was busy; the
/// next cycle tries again.
fn clear_outputs(reg: &ProcReg, frames: usize, output: &[Cell<f32>]) -> bool {
    let mut cleared = true;
    for bound in reg.bindings.iter().filter(|b| b.direction == Direction::Out) {
        match &bound.target {
            BoundTarget::Lane(lane) => {
                if let Some(samples) = output.get(lane * frames..(lane + 1) * frames) {
                    for s in samples {
                        s.set(0.0);
                    }
                }
            }
            BoundTarget::Buffer(storage) => {
                cleared &= storage.try_clear(frames);
            }
        }
    }
    cleared
}
