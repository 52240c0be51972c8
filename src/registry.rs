//! Processor registry.
//!
//! Every mutation builds a fresh [`Snapshot`] from the current one and
//! publishes it through the [`Handoff`]. Published snapshots are never
//! modified; the callback reads them without locks.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connector::{Binding, ConnectorTable, EngineId};
use crate::error::{RegisterError, StreamError, UnregisterError};
use crate::handoff::{Handoff, Snapshot};
use crate::invariant_ppt::{
    assert_invariant, BUFFER_PINNED_BY_CONSUMER, SETUP_ROLLBACK_CLEAN, SNAPSHOT_CONFIRMED,
    SNAPSHOT_UNIQUE,
};
use crate::processor::{ProcReg, Processor, ProcessorHandle};

/// Stream state a registry mutation runs against.
pub(crate) struct Session<'a> {
    pub connectors: &'a mut ConnectorTable,
    pub handoff: &'a Handoff,
    pub running: bool,
    pub buffer_frames: u32,
}

pub(crate) struct Registry {
    engine: EngineId,
    current: Arc<Snapshot>,
    next_serial: u64,
    next_epoch: u64,
}

impl Registry {
    pub fn new(engine: EngineId) -> Self {
        Self {
            engine,
            current: Arc::new(Snapshot::empty(0)),
            next_serial: 1,
            next_epoch: 1,
        }
    }

    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.current.entries.len()
    }

    pub fn find(&self, handle: ProcessorHandle) -> Option<&Arc<ProcReg>> {
        if handle.engine != self.engine {
            return None;
        }
        self.current.entries.iter().find(|r| r.serial == handle.serial)
    }

    fn next_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    /// Empty snapshot with a fresh epoch, for closing a stream.
    pub fn empty_snapshot(&mut self) -> Arc<Snapshot> {
        Arc::new(Snapshot::empty(self.next_epoch()))
    }

    fn build(&self, capacity: usize, entries: impl Iterator<Item = Arc<ProcReg>>) -> Result<Vec<Arc<ProcReg>>, ()> {
        let mut list = Vec::new();
        list.try_reserve_exact(capacity).map_err(|_| ())?;
        list.extend(entries);
        Ok(list)
    }

    fn publish(&mut self, session: &Session<'_>, entries: Vec<Arc<ProcReg>>) {
        let mut seen = HashSet::with_capacity(entries.len());
        assert_invariant(
            SNAPSHOT_UNIQUE,
            entries.iter().all(|r| seen.insert(r.serial)),
            "registration appears twice in snapshot",
            None,
        );
        let snapshot = Arc::new(Snapshot {
            epoch: self.next_epoch(),
            entries: entries.into_boxed_slice(),
        });
        let epoch = snapshot.epoch;
        session.handoff.publish(Arc::clone(&snapshot), session.running);
        assert_invariant(
            SNAPSHOT_CONFIRMED,
            session.handoff.confirmed_epoch() == epoch,
            "publish returned before confirmation",
            None,
        );
        // Dropping the previous Arc frees its backing array here, off the callback thread.
        self.current = snapshot;
    }

    pub fn register(
        &mut self,
        session: Session<'_>,
        name: &str,
        mut processor: Box<dyn Processor>,
        bindings: &[Binding],
    ) -> Result<ProcessorHandle, RegisterError> {
        if name.is_empty() {
            return Err(RegisterError::CallInvalid("processor name is empty"));
        }
        let bound = session.connectors.bind(bindings)?;
        let mut entries = self
            .build(
                self.current.entries.len() + 1,
                self.current.entries.iter().cloned(),
            )
            .map_err(|()| RegisterError::ResourceExhausted)?;

        let serial = self.next_serial;
        if let Err(code) = processor.buffer_size_changed(session.buffer_frames) {
            log::warn!(
                "processor '{}' rejected buffer size {} with code {}",
                name,
                session.buffer_frames,
                code
            );
            assert_invariant(
                SETUP_ROLLBACK_CLEAN,
                self.current.entries.iter().all(|r| r.serial != serial),
                "rejected registration leaked into registry",
                None,
            );
            return Err(RegisterError::SetupRejected {
                processor: name.to_owned(),
                frames: session.buffer_frames,
                code,
            });
        }

        let reg = Arc::new(ProcReg {
            serial,
            name: name.to_owned(),
            processor: Mutex::new(processor),
            bindings: bound,
            activated: AtomicBool::new(false),
            out_buffers_cleared: AtomicBool::new(false),
            buffer_frames: session.buffer_frames,
        });
        entries.push(Arc::clone(&reg));

        session.connectors.claim(&reg.bindings);
        self.next_serial += 1;
        self.publish(&session, entries);
        log::debug!("registered processor '{}' with {} connectors", name, bindings.len());
        Ok(ProcessorHandle {
            engine: self.engine,
            serial,
        })
    }

    pub fn unregister(
        &mut self,
        session: Session<'_>,
        handle: ProcessorHandle,
    ) -> Result<Arc<ProcReg>, UnregisterError> {
        let reg = Arc::clone(self.find(handle).ok_or(StreamError::NotRegistered)?);
        if let Some(index) = session.connectors.output_consumed(&reg.bindings) {
            assert_invariant(
                BUFFER_PINNED_BY_CONSUMER,
                self.find(handle).is_some(),
                "refused unregistration must keep the registration",
                None,
            );
            return Err(UnregisterError::OutputInUse { index });
        }
        let entries = self
            .build(
                self.current.entries.len().saturating_sub(1),
                self.current
                    .entries
                    .iter()
                    .filter(|r| r.serial != reg.serial)
                    .cloned(),
            )
            .map_err(|()| UnregisterError::ResourceExhausted)?;
        self.publish(&session, entries);

        let was_active = reg.activated.swap(false, Ordering::AcqRel);
        session.connectors.release(&reg.bindings, was_active);
        log::debug!("unregistered processor '{}'", reg.name);
        Ok(reg)
    }

    /// Set the activation flag. Returns false if it already had that value.
    pub fn set_active(
        &self,
        connectors: &mut ConnectorTable,
        handle: ProcessorHandle,
        active: bool,
    ) -> Result<bool, StreamError> {
        let reg = self.find(handle).ok_or(StreamError::NotRegistered)?;
        if reg.activated.load(Ordering::Acquire) == active {
            return Ok(false);
        }
        connectors.set_active(&reg.bindings, active);
        reg.activated.store(active, Ordering::Release);
        Ok(true)
    }

    /// Drop every registration without republishing. The stream must no
    /// longer be calling back.
    pub fn release_all(&mut self) -> Vec<Arc<ProcReg>> {
        let regs = self.current.entries.to_vec();
        self.current = Arc::new(Snapshot::empty(self.next_epoch()));
        regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorTable, Direction};
    use crate::processor::from_fn;

    struct Fixture {
        connectors: ConnectorTable,
        handoff: Handoff,
        registry: Registry,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = EngineId::next();
            let registry = Registry::new(engine);
            Self {
                connectors: ConnectorTable::new(engine),
                handoff: Handoff::new(Arc::clone(registry.current())),
                registry,
            }
        }

        fn session(&mut self) -> (&mut Registry, Session<'_>) {
            (
                &mut self.registry,
                Session {
                    connectors: &mut self.connectors,
                    handoff: &self.handoff,
                    running: false,
                    buffer_frames: 64,
                },
            )
        }
    }

    fn silent() -> Box<dyn Processor> {
        Box::new(from_fn(|_| Ok(())))
    }

    #[test]
    fn register_appends_in_order() {
        let mut fx = Fixture::new();
        let out = fx.connectors.add_channel(Direction::Out, 1, 0);
        let (reg, s) = fx.session();
        let a = reg.register(s, "a", silent(), &[Binding::audio_out(out)]).unwrap();
        let (reg, s) = fx.session();
        let b = reg.register(s, "b", silent(), &[]).unwrap();
        let names: Vec<_> = fx.handoff.load().entries.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn setup_rejection_leaves_no_trace() {
        struct Picky;
        impl Processor for Picky {
            fn process(&mut self, _: &crate::scope::ProcessScope<'_>) -> Result<(), i32> {
                Ok(())
            }
            fn buffer_size_changed(&mut self, frames: u32) -> Result<(), i32> {
                if frames == 64 {
                    Err(-22)
                } else {
                    Ok(())
                }
            }
        }
        let mut fx = Fixture::new();
        let out = fx.connectors.add_channel(Direction::Out, 1, 0);
        let epoch = fx.handoff.confirmed_epoch();
        let (reg, s) = fx.session();
        let err = reg
            .register(s, "picky", Box::new(Picky), &[Binding::audio_out(out)])
            .unwrap_err();
        assert!(matches!(err, RegisterError::SetupRejected { code: -22, frames: 64, .. }));
        assert_eq!(fx.registry.len(), 0);
        assert_eq!(fx.handoff.confirmed_epoch(), epoch);
        assert_eq!(fx.connectors.channel(out).unwrap().usage, 0);
    }

    #[test]
    fn empty_name_is_call_invalid() {
        let mut fx = Fixture::new();
        let (reg, s) = fx.session();
        assert!(matches!(
            reg.register(s, "", silent(), &[]),
            Err(RegisterError::CallInvalid(_))
        ));
    }

    #[test]
    fn foreign_handle_not_registered() {
        let mut fx = Fixture::new();
        let (reg, s) = fx.session();
        let h = reg.register(s, "a", silent(), &[]).unwrap();
        let other = Registry::new(EngineId::next());
        assert!(other.find(h).is_none());
    }

    #[test]
    fn activation_toggles_are_idempotent() {
        let mut fx = Fixture::new();
        let (reg, s) = fx.session();
        let h = reg.register(s, "a", silent(), &[]).unwrap();
        assert_eq!(fx.registry.set_active(&mut fx.connectors, h, true), Ok(true));
        assert_eq!(fx.registry.set_active(&mut fx.connectors, h, true), Ok(false));
        assert_eq!(fx.registry.set_active(&mut fx.connectors, h, false), Ok(true));
        assert_eq!(fx.registry.set_active(&mut fx.connectors, h, false), Ok(false));
    }
}
