// demos/sine_to_wav.rs
use rtstream::harness::{manual_device, write_wav};
use rtstream::{from_fn, Binding, Engine, StreamConfig};
use std::f32::consts::TAU;

fn main() {
    let (device, driver) = manual_device(44_100);
    let engine = Engine::new(device);
    engine
        .open_stream(StreamConfig::output(1, 512).with_name("sine"))
        .unwrap();
    let out = engine.output_channel(0).unwrap();

    // 440Hz sine driven by the stream's frame clock
    let osc = engine
        .register_processor(
            "sine",
            from_fn(|scope| {
                let start = scope.frame_time();
                scope.audio_out(0).ok_or(-1)?.apply(|i, s| {
                    let t = (start + i as u64) as f32 / 44_100.0;
                    *s = 0.5 * (TAU * 440.0 * t).sin();
                });
                Ok(())
            }),
            &[Binding::audio_out(out)],
        )
        .unwrap();
    engine.activate_processor(osc).unwrap();
    engine.start_stream().unwrap();

    // About one second of audio
    let cycles = 44_100usize.div_ceil(512);
    let samples = driver.render_lane(0, cycles);
    write_wav("sine.wav", 44_100, &samples).unwrap();

    println!("Generated sine.wav - open it and you should hear a 440Hz tone");
}
