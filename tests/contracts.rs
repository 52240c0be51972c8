//! Contract tests for control-path invariants.
//!
//! Each test drives a scenario through the public API and then checks that
//! the invariants guarding it were actually evaluated.

use rtstream::harness::manual_device;
use rtstream::invariant_ppt::{
    contract_test, BINDING_REJECTED_CLEAN, BUFFER_PINNED_BY_CONSUMER, CHANNEL_OUTPUT_EXCLUSIVE,
    COUNTERS_BALANCED, PRODUCER_BEFORE_CONSUMER, SETUP_ROLLBACK_CLEAN, SEVERE_CLOSE_STICKY,
    SNAPSHOT_CONFIRMED, SNAPSHOT_UNIQUE,
};
use rtstream::invariant_rt::{contract_test_rt, INV_PROCESSOR_FAILED, INV_SNAPSHOT_CONFIRMED};
use rtstream::{
    from_fn, Binding, ConnectorType, Engine, ProcessScope, Processor, StreamConfig, StreamError,
};

struct RejectsEverySize;

impl Processor for RejectsEverySize {
    fn process(&mut self, _scope: &ProcessScope<'_>) -> Result<(), i32> {
        Ok(())
    }

    fn buffer_size_changed(&mut self, _frames: u32) -> Result<(), i32> {
        Err(-1)
    }
}

#[test]
fn registry_contract() {
    let (device, _driver) = manual_device(48_000);
    let engine = Engine::new(device);
    engine.open_stream(StreamConfig::output(1, 64)).unwrap();
    let out = engine.output_channel(0).unwrap();
    let bus = engine.new_process_buffer(ConnectorType::Audio).unwrap();

    let producer = engine
        .register_processor("producer", from_fn(|_| Ok(())), &[Binding::audio_out(out), Binding::audio_out(bus)])
        .unwrap();
    let consumer = engine
        .register_processor("consumer", from_fn(|_| Ok(())), &[Binding::audio_in(bus)])
        .unwrap();
    assert!(engine
        .register_processor("rival", from_fn(|_| Ok(())), &[Binding::audio_out(out)])
        .is_err());
    assert!(engine
        .register_processor("picky", RejectsEverySize, &[])
        .is_err());
    assert!(engine.unregister_processor(producer).is_err());
    engine.unregister_processor(consumer).unwrap();
    engine.unregister_processor(producer).unwrap();

    contract_test(
        "registry_contract",
        &[
            SNAPSHOT_UNIQUE,
            SNAPSHOT_CONFIRMED,
            CHANNEL_OUTPUT_EXCLUSIVE,
            PRODUCER_BEFORE_CONSUMER,
            COUNTERS_BALANCED,
            BINDING_REJECTED_CLEAN,
            BUFFER_PINNED_BY_CONSUMER,
            SETUP_ROLLBACK_CLEAN,
        ],
    );
}

#[test]
fn severe_error_contract() {
    let (device, driver) = manual_device(48_000);
    let engine = Engine::new(device);
    engine.open_stream(StreamConfig::output(1, 64)).unwrap();
    let h = engine
        .register_processor("bad", from_fn(|_| Err(-3)), &[])
        .unwrap();
    engine.activate_processor(h).unwrap();
    engine.start_stream().unwrap();
    assert_eq!(driver.run_cycle(), Some(Err(-3)));

    let signals = engine.drain_invariant_signals();
    contract_test_rt(
        "severe_error_contract",
        &signals,
        &[INV_SNAPSHOT_CONFIRMED, INV_PROCESSOR_FAILED],
    );

    assert_eq!(engine.check_not_closed(), Err(StreamError::ClosedBySevereError));
    assert_eq!(engine.check_not_closed(), Err(StreamError::ClosedBySevereError));
    contract_test("severe_error_contract", &[SEVERE_CLOSE_STICKY]);
}
