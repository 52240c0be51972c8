//! In-process audio backends for proofs, demos and benches.
//!
//! [`ManualDevice`] calls back only when a test asks it to, through its
//! [`ManualDriver`]. [`ClockedDevice`] calls back from its own thread at a
//! fixed period, like a real device.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::callback::StreamCallback;
use crate::config::StreamConfig;
use crate::device::{AudioBackend, NegotiatedStream};
use crate::error::DeviceError;

struct ManualState {
    callback: Option<StreamCallback>,
    started: bool,
    frames: usize,
    outputs: usize,
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Backend half of a manually driven device.
pub struct ManualDevice {
    state: Arc<Mutex<ManualState>>,
    sample_rate: u32,
    forced_frames: Option<u32>,
}

/// Test half of a manually driven device.
#[derive(Clone)]
pub struct ManualDriver {
    state: Arc<Mutex<ManualState>>,
}

/// Create a manually driven device pair.
pub fn manual_device(sample_rate: u32) -> (ManualDevice, ManualDriver) {
    let state = Arc::new(Mutex::new(ManualState {
        callback: None,
        started: false,
        frames: 0,
        outputs: 0,
        input: Vec::new(),
        output: Vec::new(),
    }));
    (
        ManualDevice {
            state: Arc::clone(&state),
            sample_rate,
            forced_frames: None,
        },
        ManualDriver { state },
    )
}

impl ManualDevice {
    /// Negotiate `frames` regardless of what the stream asks for.
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.forced_frames = Some(frames);
        self
    }
}

impl AudioBackend for ManualDevice {
    fn open(&mut self, config: &StreamConfig, callback: StreamCallback) -> Result<NegotiatedStream, DeviceError> {
        let frames = self.forced_frames.unwrap_or(config.buffer_frames);
        let mut st = self.state.lock();
        st.frames = frames as usize;
        st.outputs = config.output_channels as usize;
        st.input = vec![0.0; frames as usize * config.input_channels as usize];
        st.output = vec![0.0; frames as usize * config.output_channels as usize];
        st.callback = Some(callback);
        st.started = false;
        Ok(NegotiatedStream {
            sample_rate: config.sample_rate.unwrap_or(self.sample_rate),
            buffer_frames: frames,
        })
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let mut st = self.state.lock();
        if st.callback.is_none() {
            return Err(DeviceError::Start("no stream open".into()));
        }
        st.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.state.lock().started = false;
        Ok(())
    }

    fn close(&mut self) {
        let mut st = self.state.lock();
        st.started = false;
        st.callback = None;
    }
}

impl ManualDriver {
    /// Run one device cycle. `None` when the device is not started.
    pub fn run_cycle(&self) -> Option<Result<(), i32>> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if !st.started {
            return None;
        }
        let callback = st.callback.as_mut()?;
        Some(callback.process(st.frames as u32, &st.input, &mut st.output))
    }

    /// Run up to `n` cycles; returns how many ran.
    pub fn run_cycles(&self, n: usize) -> usize {
        (0..n).take_while(|_| self.run_cycle().is_some()).count()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn buffer_frames(&self) -> usize {
        self.state.lock().frames
    }

    /// Current samples of output lane `lane`.
    pub fn output_lane(&self, lane: usize) -> Vec<f32> {
        let st = self.state.lock();
        st.output
            .get(lane * st.frames..(lane + 1) * st.frames)
            .map(<[f32]>::to_vec)
            .unwrap_or_default()
    }

    pub fn set_input_lane(&self, lane: usize, samples: &[f32]) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let frames = st.frames;
        if let Some(dst) = st.input.get_mut(lane * frames..(lane + 1) * frames) {
            let n = dst.len().min(samples.len());
            dst[..n].copy_from_slice(&samples[..n]);
        }
    }

    /// Overwrite every output lane, e.g. with garbage a clear must remove.
    pub fn fill_output(&self, value: f32) {
        self.state.lock().output.fill(value);
    }

    pub fn output_lanes(&self) -> usize {
        self.state.lock().outputs
    }

    /// Simulate a device failure reported from the audio thread.
    pub fn signal_device_failure(&self) {
        if let Some(cb) = self.state.lock().callback.as_ref() {
            cb.device_shutdown();
        }
    }

    /// Run `cycles` cycles and collect output lane `lane`.
    pub fn render_lane(&self, lane: usize, cycles: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(cycles * self.buffer_frames());
        for _ in 0..cycles {
            if self.run_cycle().is_none() {
                break;
            }
            out.extend(self.output_lane(lane));
        }
        out
    }
}

struct ClockedStream {
    callback: StreamCallback,
    frames: u32,
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Device that calls back from a dedicated thread every `period`.
pub struct ClockedDevice {
    period: Duration,
    sample_rate: u32,
    stream: Arc<Mutex<Option<ClockedStream>>>,
    running: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl ClockedDevice {
    pub fn new(period: Duration, sample_rate: u32) -> Self {
        Self {
            period,
            sample_rate,
            stream: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            cycles: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// Shared count of completed cycles.
    pub fn cycle_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.cycles)
    }

    fn join(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("clocked device thread panicked");
            }
        }
    }
}

impl AudioBackend for ClockedDevice {
    fn open(&mut self, config: &StreamConfig, callback: StreamCallback) -> Result<NegotiatedStream, DeviceError> {
        let frames = config.buffer_frames;
        *self.stream.lock() = Some(ClockedStream {
            callback,
            frames,
            input: vec![0.0; frames as usize * config.input_channels as usize],
            output: vec![0.0; frames as usize * config.output_channels as usize],
        });
        Ok(NegotiatedStream {
            sample_rate: config.sample_rate.unwrap_or(self.sample_rate),
            buffer_frames: frames,
        })
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);
        let stream = Arc::clone(&self.stream);
        let running = Arc::clone(&self.running);
        let cycles = Arc::clone(&self.cycles);
        let period = self.period;
        let handle = std::thread::Builder::new()
            .name("rtstream-clock".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    if let Some(s) = stream.lock().as_mut() {
                        let _ = s.callback.process(s.frames, &s.input, &mut s.output);
                        cycles.fetch_add(1, Ordering::Release);
                    }
                    std::thread::sleep(period);
                }
            })
            .map_err(|e| DeviceError::Start(e.to_string()))?;
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.join();
        Ok(())
    }

    fn close(&mut self) {
        self.join();
        *self.stream.lock() = None;
    }
}

impl Drop for ClockedDevice {
    fn drop(&mut self) {
        self.join();
    }
}

/// Write mono samples as 16-bit PCM.
pub fn write_wav(path: impl AsRef<Path>, sample_rate: u32, samples: &[f32]) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_driver_idle_until_started() {
        let (_device, driver) = manual_device(48_000);
        assert!(driver.run_cycle().is_none());
        assert_eq!(driver.run_cycles(4), 0);
        assert!(driver.output_lane(0).is_empty());
    }
}
