use rtstream::harness::{manual_device, ManualDriver};
use rtstream::invariant_rt::{
    count_invariant_signals, INV_CYCLE_SKIPPED, INV_OUTPUTS_CLEARED, INV_PROCESSOR_FAILED,
};
use rtstream::{
    from_fn, Binding, ChannelSink, ConnectorType, Engine, Processor, RegisterError, StatusKind,
    StreamConfig, StreamError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn open(config: StreamConfig) -> (Engine, ManualDriver) {
    let (device, driver) = manual_device(48_000);
    let engine = Engine::new(device);
    engine.open_stream(config).unwrap();
    (engine, driver)
}

fn constant(value: f32) -> impl Processor {
    from_fn(move |scope| {
        if let Some(mut out) = scope.audio_out(0) {
            out.fill(value);
        }
        Ok(())
    })
}

fn failing(code: i32) -> impl Processor {
    from_fn(move |_| Err(code))
}

#[test]
fn two_channel_scenario() {
    let (engine, driver) = open(StreamConfig::output(2, 256));
    let ch1 = engine.output_channel(0).unwrap();
    let ch2 = engine.output_channel(1).unwrap();

    let a = engine
        .register_processor("A", constant(0.5), &[Binding::audio_out(ch1)])
        .unwrap();
    engine.activate_processor(a).unwrap();
    let b = engine
        .register_processor("B", constant(0.25), &[Binding::audio_out(ch2)])
        .unwrap();

    engine.start_stream().unwrap();
    driver.fill_output(9.0);
    assert_eq!(driver.run_cycle(), Some(Ok(())));

    assert!(driver.output_lane(0).iter().all(|&s| s == 0.5));
    assert_eq!(driver.output_lane(1), vec![0.0; 256]);
    assert!(engine.processor_info(b).unwrap().outputs_cleared);
    assert!(!engine.processor_info(a).unwrap().outputs_cleared);

    engine.deactivate_processor(a).unwrap();
    assert_eq!(driver.run_cycle(), Some(Ok(())));
    assert_eq!(driver.output_lane(0), vec![0.0; 256]);
}

#[test]
fn outputs_cleared_once_per_deactivation() {
    let (engine, driver) = open(StreamConfig::output(1, 64));
    let ch = engine.output_channel(0).unwrap();
    let a = engine
        .register_processor("A", constant(1.0), &[Binding::audio_out(ch)])
        .unwrap();
    engine.activate_processor(a).unwrap();
    engine.start_stream().unwrap();

    driver.run_cycles(2);
    engine.drain_invariant_signals();

    engine.deactivate_processor(a).unwrap();
    driver.run_cycles(3);
    let counts = count_invariant_signals(&engine.drain_invariant_signals());
    assert_eq!(counts[INV_OUTPUTS_CLEARED as usize], 1);

    // No redundant clear: whatever lands in the lane now stays there.
    driver.fill_output(0.7);
    driver.run_cycle();
    assert!(driver.output_lane(0).iter().all(|&s| s == 0.7));

    engine.activate_processor(a).unwrap();
    driver.run_cycle();
    engine.deactivate_processor(a).unwrap();
    driver.run_cycles(4);
    let counts = count_invariant_signals(&engine.drain_invariant_signals());
    assert_eq!(counts[INV_OUTPUTS_CLEARED as usize], 1);
    assert_eq!(driver.output_lane(0), vec![0.0; 64]);
}

#[test]
fn fatal_error_closes_stream_with_one_notification() {
    let (device, driver) = manual_device(48_000);
    let (sink, rx) = ChannelSink::bounded(8);
    let engine = Engine::new(device).with_status_sink(Arc::new(sink));
    engine.open_stream(StreamConfig::output(2, 32)).unwrap();
    let ch1 = engine.output_channel(0).unwrap();
    let ch2 = engine.output_channel(1).unwrap();

    let bad = engine
        .register_processor("bad", failing(-5), &[Binding::audio_out(ch1)])
        .unwrap();
    let after = engine
        .register_processor("after", constant(1.0), &[Binding::audio_out(ch2)])
        .unwrap();
    engine.activate_processor(bad).unwrap();
    engine.activate_processor(after).unwrap();
    engine.start_stream().unwrap();

    driver.fill_output(3.0);
    assert_eq!(driver.run_cycle(), Some(Err(-5)));
    // Iteration aborted before "after" ran.
    assert!(driver.output_lane(1).iter().all(|&s| s == 3.0));

    let msgs: Vec<_> = rx.try_iter().collect();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].kind, StatusKind::ProcessingError);
    assert_eq!(msgs[0].processor, "bad");
    assert_eq!(msgs[0].code, -5);

    // The device keeps calling until the control path notices.
    assert_eq!(driver.run_cycle(), Some(Ok(())));
    let counts = count_invariant_signals(&engine.drain_invariant_signals());
    assert_eq!(counts[INV_PROCESSOR_FAILED as usize], 1);
    assert_eq!(counts[INV_CYCLE_SKIPPED as usize], 1);

    assert_eq!(engine.check_not_closed(), Err(StreamError::ClosedBySevereError));
    assert!(engine.is_closed());
    assert_eq!(driver.run_cycle(), None);
    assert!(matches!(
        engine.register_processor("late", constant(0.0), &[]),
        Err(RegisterError::Stream(StreamError::ClosedBySevereError))
    ));
    assert_eq!(
        engine.new_process_buffer(ConnectorType::Audio),
        Err(StreamError::ClosedBySevereError)
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn frame_time_advances_even_on_abort() {
    let (engine, driver) = open(StreamConfig::output(1, 64));
    let ch = engine.output_channel(0).unwrap();
    let bad = engine
        .register_processor("bad", failing(1), &[Binding::audio_out(ch)])
        .unwrap();
    engine.activate_processor(bad).unwrap();
    engine.start_stream().unwrap();

    assert_eq!(engine.current_frame_time(), Ok(0));
    assert_eq!(driver.run_cycle(), Some(Err(1)));
    assert_eq!(engine.current_frame_time(), Ok(64));
}

#[test]
fn processors_see_cycle_start_frame_time() {
    let (engine, driver) = open(StreamConfig::output(1, 64));
    let seen = Arc::new(AtomicU64::new(u64::MAX));
    let sink = Arc::clone(&seen);
    let h = engine
        .register_processor(
            "clock",
            from_fn(move |scope| {
                sink.store(scope.frame_time(), Ordering::Relaxed);
                Ok(())
            }),
            &[],
        )
        .unwrap();
    engine.activate_processor(h).unwrap();
    engine.start_stream().unwrap();

    assert_eq!(driver.run_cycles(3), 3);
    assert_eq!(seen.load(Ordering::Relaxed), 128);
    assert_eq!(engine.current_frame_time(), Ok(192));
    assert_eq!(engine.frame_time(), Ok(256));
}

#[test]
fn device_failure_reports_plain_closed() {
    let (engine, driver) = open(StreamConfig::output(1, 16));
    engine.start_stream().unwrap();
    driver.run_cycle();
    driver.signal_device_failure();
    assert_eq!(engine.check_not_closed(), Err(StreamError::Closed));
    assert!(engine.is_closed());
}

#[test]
fn input_lane_passes_through() {
    let (engine, driver) = open(StreamConfig::duplex(2, 1, 32));
    let in2 = engine.input_channel(1).unwrap();
    let out = engine.output_channel(0).unwrap();
    let h = engine
        .register_processor(
            "thru",
            from_fn(|scope| {
                let input = scope.audio_in(0).ok_or(-1)?;
                let mut output = scope.audio_out(1).ok_or(-2)?;
                output.copy_from_slice(&input);
                Ok(())
            }),
            &[Binding::audio_in(in2), Binding::audio_out(out)],
        )
        .unwrap();
    engine.activate_processor(h).unwrap();
    engine.start_stream().unwrap();

    let ramp: Vec<f32> = (0..32).map(|i| i as f32 / 32.0).collect();
    driver.set_input_lane(1, &ramp);
    assert_eq!(driver.run_cycle(), Some(Ok(())));
    assert_eq!(driver.output_lane(0), ramp);
}

#[test]
fn audio_buffer_feeds_registered_consumer() {
    let (engine, driver) = open(StreamConfig::output(1, 16));
    let out = engine.output_channel(0).unwrap();
    let bus = engine.new_process_buffer(ConnectorType::Audio).unwrap();

    let producer = engine
        .register_processor("producer", constant(0.25), &[Binding::audio_out(bus)])
        .unwrap();
    let consumer = engine
        .register_processor(
            "double",
            from_fn(|scope| {
                let src = scope.audio_in(0).ok_or(-1)?;
                let mut dst = scope.audio_out(1).ok_or(-2)?;
                dst.apply(|i, x| *x = src[i] * 2.0);
                Ok(())
            }),
            &[Binding::audio_in(bus), Binding::audio_out(out)],
        )
        .unwrap();
    engine.activate_processor(producer).unwrap();
    engine.activate_processor(consumer).unwrap();
    engine.start_stream().unwrap();

    driver.run_cycle();
    assert!(driver.output_lane(0).iter().all(|&s| s == 0.5));
    assert!(engine.read_audio_buffer(bus).unwrap().iter().all(|&s| s == 0.25));

    engine.deactivate_processor(producer).unwrap();
    driver.run_cycle();
    assert!(engine.read_audio_buffer(bus).unwrap().iter().all(|&s| s == 0.0));
    assert!(driver.output_lane(0).iter().all(|&s| s == 0.0));
}

#[test]
fn events_flow_between_processors() {
    let (engine, driver) = open(StreamConfig::output(1, 16));
    let out = engine.output_channel(0).unwrap();
    let events = engine.new_process_buffer(ConnectorType::Event).unwrap();

    let producer = engine
        .register_processor(
            "notes",
            from_fn(|scope| {
                let mut ev = scope.events_out(0).ok_or(-1)?;
                ev.reset();
                ev.push(3, &[0x90, 60, 100]);
                ev.push(9, &[0x80, 60, 0]);
                Ok(())
            }),
            &[Binding::event_out(events)],
        )
        .unwrap();
    let consumer = engine
        .register_processor(
            "count",
            from_fn(|scope| {
                let ev = scope.events_in(0).ok_or(-1)?;
                let mut dst = scope.audio_out(1).ok_or(-2)?;
                dst.fill(0.0);
                for e in ev.iter() {
                    dst.set(e.time as usize, e.data[0] as f32);
                }
                Ok(())
            }),
            &[Binding::event_in(events), Binding::audio_out(out)],
        )
        .unwrap();
    engine.activate_processor(producer).unwrap();
    engine.activate_processor(consumer).unwrap();
    engine.start_stream().unwrap();

    driver.run_cycle();
    let lane = driver.output_lane(0);
    assert_eq!(lane[3], 144.0);
    assert_eq!(lane[9], 128.0);
    assert_eq!(lane.iter().filter(|&&s| s != 0.0).count(), 2);

    // Deactivating the producer drops its events.
    engine.deactivate_processor(producer).unwrap();
    driver.run_cycle();
    assert!(driver.output_lane(0).iter().all(|&s| s == 0.0));
}

#[test]
fn wrong_port_type_yields_none() {
    let (engine, driver) = open(StreamConfig::output(1, 8));
    let out = engine.output_channel(0).unwrap();
    let h = engine
        .register_processor(
            "watcher",
            from_fn(|scope| {
                if scope.audio_in(0).is_some() || scope.events_out(0).is_some() || scope.audio_out(5).is_some() {
                    return Err(-1);
                }
                if scope.port_count() != 1 || scope.nframes() != 8 {
                    return Err(-2);
                }
                Ok(())
            }),
            &[Binding::audio_out(out)],
        )
        .unwrap();
    engine.activate_processor(h).unwrap();
    engine.start_stream().unwrap();
    assert_eq!(driver.run_cycle(), Some(Ok(())));
}
