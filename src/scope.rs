//! Per-cycle buffer access handed to processors.

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::ops::Deref;

use crate::connector::{AudioStorage, BoundConnector, BoundTarget, ConnectorType, Direction};
use crate::event_buf::EventBuffer;

/// What a processor sees during one cycle: the frame count, the frame time
/// at cycle start and its bound connectors, addressed by binding index.
///
/// The accessors return `None` only when `port` is out of range, is bound
/// with the other direction or type, or names a buffer shorter than
/// `nframes`. The control side never holds a process buffer's lock while
/// a stream runs, so a correctly bound port always yields its samples.
pub struct ProcessScope<'a> {
    nframes: usize,
    frame_time: u64,
    bindings: &'a [BoundConnector],
    input: &'a [f32],
    output: &'a [Cell<f32>],
}

impl<'a> ProcessScope<'a> {
    pub(crate) fn new(
        nframes: usize,
        frame_time: u64,
        bindings: &'a [BoundConnector],
        input: &'a [f32],
        output: &'a [Cell<f32>],
    ) -> Self {
        Self {
            nframes,
            frame_time,
            bindings,
            input,
            output,
        }
    }

    pub fn nframes(&self) -> usize {
        self.nframes
    }

    /// Frame time at the beginning of this cycle.
    pub fn frame_time(&self) -> u64 {
        self.frame_time
    }

    pub fn port_count(&self) -> usize {
        self.bindings.len()
    }

    fn binding(&self, port: usize, direction: Direction, kind: ConnectorType) -> Option<&'a BoundConnector> {
        self.bindings
            .get(port)
            .filter(|b| b.direction == direction && b.kind == kind)
    }

    fn lane_range(&self, lane: usize) -> std::ops::Range<usize> {
        lane * self.nframes..(lane + 1) * self.nframes
    }

    /// Samples of audio input `port`.
    pub fn audio_in(&self, port: usize) -> Option<AudioIn<'a>> {
        match &self.binding(port, Direction::In, ConnectorType::Audio)?.target {
            BoundTarget::Lane(lane) => self.input.get(self.lane_range(*lane)).map(AudioIn::Lane),
            BoundTarget::Buffer(storage) => storage.try_audio(self.nframes).map(AudioIn::Buffer),
        }
    }

    /// Writable samples of audio output `port`.
    pub fn audio_out(&self, port: usize) -> Option<AudioOut<'a>> {
        match &self.binding(port, Direction::Out, ConnectorType::Audio)?.target {
            BoundTarget::Lane(lane) => self
                .output
                .get(self.lane_range(*lane))
                .map(|s| AudioOut(OutTarget::Lane(s))),
            BoundTarget::Buffer(storage) => storage
                .try_audio_mut(self.nframes)
                .map(|(samples, tap)| AudioOut(OutTarget::Buffer(samples, tap))),
        }
    }

    pub fn events_in(&self, port: usize) -> Option<RwLockReadGuard<'a, EventBuffer>> {
        match &self.binding(port, Direction::In, ConnectorType::Event)?.target {
            BoundTarget::Buffer(storage) => storage.try_events(),
            BoundTarget::Lane(_) => None,
        }
    }

    /// Event output `port`. The producer resets it before writing a cycle's events.
    pub fn events_out(&self, port: usize) -> Option<RwLockWriteGuard<'a, EventBuffer>> {
        match &self.binding(port, Direction::Out, ConnectorType::Event)?.target {
            BoundTarget::Buffer(storage) => storage.try_events_mut(),
            BoundTarget::Lane(_) => None,
        }
    }
}

/// Readable audio samples for one cycle.
pub enum AudioIn<'a> {
    Lane(&'a [f32]),
    Buffer(MappedRwLockReadGuard<'a, [f32]>),
}

impl Deref for AudioIn<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match self {
            AudioIn::Lane(s) => s,
            AudioIn::Buffer(g) => &**g,
        }
    }
}

/// Writable audio samples for one cycle.
///
/// Process buffer samples are mirrored for control-side readers when the
/// value is dropped.
pub struct AudioOut<'a>(OutTarget<'a>);

enum OutTarget<'a> {
    Lane(&'a [Cell<f32>]),
    Buffer(MappedRwLockWriteGuard<'a, [f32]>, &'a AudioStorage),
}

impl AudioOut<'_> {
    pub fn len(&self) -> usize {
        match &self.0 {
            OutTarget::Lane(s) => s.len(),
            OutTarget::Buffer(g, _) => g.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<f32> {
        match &self.0 {
            OutTarget::Lane(s) => s.get(i).map(Cell::get),
            OutTarget::Buffer(g, _) => g.get(i).copied(),
        }
    }

    pub fn set(&mut self, i: usize, value: f32) {
        match &mut self.0 {
            OutTarget::Lane(s) => {
                if let Some(c) = s.get(i) {
                    c.set(value);
                }
            }
            OutTarget::Buffer(g, _) => {
                if let Some(x) = g.get_mut(i) {
                    *x = value;
                }
            }
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.apply(|_, x| *x = value);
    }

    /// Copy as many samples as both sides hold.
    pub fn copy_from_slice(&mut self, src: &[f32]) {
        self.apply(|i, x| {
            if let Some(&s) = src.get(i) {
                *x = s;
            }
        });
    }

    /// Run `f` over every sample with its index.
    pub fn apply(&mut self, mut f: impl FnMut(usize, &mut f32)) {
        match &mut self.0 {
            OutTarget::Lane(s) => {
                for (i, c) in s.iter().enumerate() {
                    let mut x = c.get();
                    f(i, &mut x);
                    c.set(x);
                }
            }
            OutTarget::Buffer(g, _) => {
                for (i, x) in g.iter_mut().enumerate() {
                    f(i, x);
                }
            }
        }
    }
}

impl Drop for AudioOut<'_> {
    fn drop(&mut self) {
        // A busy tap lags one cycle; the working samples are unaffected.
        if let OutTarget::Buffer(g, tap) = &self.0 {
            tap.publish(g);
        }
    }
}
