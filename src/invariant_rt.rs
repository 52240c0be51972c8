//! RT-safe invariant signaling for the stream callback.
//!
//! The callback **signals facts** through a lock-free SPSC ring; the
//! control side drains and **judges** them. Signaling never allocates,
//! never locks and never panics. A full ring drops the signal.

use rtrb::{Consumer, Producer, RingBuffer};

/// Callback adopted a newly published snapshot.
pub const INV_SNAPSHOT_CONFIRMED: u8 = 1;

/// Confirmation skipped because the processing lock was contended.
pub const INV_CONFIRM_DEFERRED: u8 = 2;

/// Outputs of an inactive processor were zeroed.
pub const INV_OUTPUTS_CLEARED: u8 = 3;

/// A processor returned an error; the stream is shutting down.
pub const INV_PROCESSOR_FAILED: u8 = 4;

/// Cycle skipped because shutdown was requested.
pub const INV_CYCLE_SKIPPED: u8 = 5;

/// A processor was skipped because its state was locked elsewhere.
pub const INV_PROCESSOR_BUSY: u8 = 6;

/// Capacity for the invariant signal ring.
pub const INVARIANT_QUEUE_CAPACITY: usize = 256;

/// Creates a new invariant signal queue pair: (callback side, control side).
pub fn new_invariant_queue() -> (Producer<u8>, Consumer<u8>) {
    RingBuffer::new(INVARIANT_QUEUE_CAPACITY)
}

#[inline]
pub fn signal_invariant(tx: &mut Producer<u8>, id: u8) {
    let _ = tx.push(id);
}

/// Drains all pending invariant signals from the queue.
pub fn drain_invariant_signals(rx: &mut Consumer<u8>) -> Vec<u8> {
    let mut signals = Vec::with_capacity(rx.slots());
    while let Ok(id) = rx.pop() {
        signals.push(id);
    }
    signals
}

/// Counts occurrences of each invariant ID in a signal list.
pub fn count_invariant_signals(signals: &[u8]) -> [usize; 256] {
    let mut counts = [0usize; 256];
    for &id in signals {
        counts[id as usize] += 1;
    }
    counts
}

/// Asserts that every required invariant was signaled at least once.
///
/// # Panics
/// Panics if any required invariant is missing.
pub fn contract_test_rt(contract_name: &str, signals: &[u8], required: &[u8]) {
    let counts = count_invariant_signals(signals);
    let missing: Vec<&str> = required
        .iter()
        .filter(|&&id| counts[id as usize] == 0)
        .map(|&id| invariant_name(id))
        .collect();

    if !missing.is_empty() {
        let present: std::collections::BTreeSet<&str> =
            signals.iter().map(|&id| invariant_name(id)).collect();
        panic!(
            "RT Contract '{}' missing invariants: {:?}. Present: {:?}",
            contract_name, missing, present
        );
    }
}

/// Maps invariant ID to human-readable name (for diagnostics only).
pub const fn invariant_name(id: u8) -> &'static str {
    match id {
        INV_SNAPSHOT_CONFIRMED => "SNAPSHOT_CONFIRMED",
        INV_CONFIRM_DEFERRED => "CONFIRM_DEFERRED",
        INV_OUTPUTS_CLEARED => "OUTPUTS_CLEARED",
        INV_PROCESSOR_FAILED => "PROCESSOR_FAILED",
        INV_CYCLE_SKIPPED => "CYCLE_SKIPPED",
        INV_PROCESSOR_BUSY => "PROCESSOR_BUSY",
        _ => "UNKNOWN",
    }
}
