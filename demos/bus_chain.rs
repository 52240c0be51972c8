// demos/bus_chain.rs
//
// Oscillator -> process buffer -> gain -> stereo out, with a note event
// buffer gating the gain. Registrations change while the stream runs.
use rtstream::harness::ClockedDevice;
use rtstream::logging::{self, LogTarget};
use rtstream::{from_fn, Binding, ConnectorType, Engine, StreamConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn main() {
    logging::install().unwrap();
    logging::set_info_target(LogTarget::Stdout);

    let device = ClockedDevice::new(Duration::from_millis(2), 48_000);
    let cycles = device.cycle_counter();
    let engine = Engine::new(device);
    engine
        .open_stream(StreamConfig::output(2, 96).with_name("bus_chain"))
        .unwrap();

    let left = engine.output_channel(0).unwrap();
    let right = engine.output_channel(1).unwrap();
    let bus = engine.new_process_buffer(ConnectorType::Audio).unwrap();
    let notes = engine.new_process_buffer(ConnectorType::Event).unwrap();
    engine.start_stream().unwrap();

    let mut phase = 0.0f32;
    let osc = engine
        .register_processor(
            "osc",
            from_fn(move |scope| {
                scope.audio_out(0).ok_or(-1)?.apply(|_, s| {
                    *s = phase.sin();
                    phase = (phase + 0.0576) % std::f32::consts::TAU;
                });
                Ok(())
            }),
            &[Binding::audio_out(bus)],
        )
        .unwrap();
    let gate = engine
        .register_processor(
            "gate",
            from_fn(|scope| {
                let mut ev = scope.events_out(0).ok_or(-1)?;
                ev.reset();
                if (scope.frame_time() / 4800) % 2 == 0 {
                    ev.push(0, &[0x90, 69, 100]);
                }
                Ok(())
            }),
            &[Binding::event_out(notes)],
        )
        .unwrap();
    let amp = engine
        .register_processor(
            "amp",
            from_fn(|scope| {
                let input = scope.audio_in(0).ok_or(-1)?;
                let open = !scope.events_in(1).ok_or(-1)?.is_empty();
                let gain = if open { 0.5 } else { 0.0 };
                scope.audio_out(2).ok_or(-1)?.apply(|i, s| *s = input[i] * gain);
                scope.audio_out(3).ok_or(-1)?.apply(|i, s| *s = input[i] * gain);
                Ok(())
            }),
            &[
                Binding::audio_in(bus),
                Binding::event_in(notes),
                Binding::audio_out(left),
                Binding::audio_out(right),
            ],
        )
        .unwrap();
    for h in [osc, gate, amp] {
        engine.activate_processor(h).unwrap();
    }
    std::thread::sleep(Duration::from_millis(200));

    // The oscillator cannot go while the amp still reads its bus.
    match engine.unregister_processor(osc) {
        Err(err) => println!("unregister osc refused: {err}"),
        Ok(()) => println!("unregister osc unexpectedly succeeded"),
    }
    engine.deactivate_processor(amp).unwrap();
    engine.unregister_processor(amp).unwrap();
    engine.unregister_processor(gate).unwrap();
    engine.unregister_processor(osc).unwrap();

    let info = engine.stream_info().unwrap();
    println!(
        "{} cycles at {} Hz x {} frames, {} processors left",
        cycles.load(Ordering::Acquire),
        info.sample_rate,
        info.buffer_frames,
        info.processors
    );
    engine.stop_stream().unwrap();
    engine.close_stream();
}
