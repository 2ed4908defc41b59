//! A critical-section protected slot for a [`Scheduler`], for embedders that
//! reach the scheduler from several execution contexts (e.g. a `static`).
use core::cell::RefCell;

use critical_section::{with, CriticalSection, Mutex};
use gekko_mem::Memory;

use crate::{MutexHooks, NoMutexes, Scheduler};

/// A [`Scheduler`] slot guarded by a critical section, usable in a `static`.
pub struct SharedScheduler<M: Memory, H: MutexHooks = NoMutexes> {
    inner: Mutex<RefCell<Option<Scheduler<M, H>>>>,
}

impl<M: Memory, H: MutexHooks> SharedScheduler<M, H> {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Installs `scheduler`, returning the previously installed one.
    ///
    /// Returns `scheduler` back if the slot is currently borrowed.
    pub fn install(&self, scheduler: Scheduler<M, H>) -> Option<Scheduler<M, H>> {
        with(|cs| match self.inner.borrow(cs).try_borrow_mut() {
            Ok(mut slot) => slot.replace(scheduler),
            Err(_) => Some(scheduler),
        })
    }

    /// Removes the installed scheduler.
    pub fn take(&self) -> Option<Scheduler<M, H>> {
        with(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow_mut()
                .ok()
                .and_then(|mut slot| slot.take())
        })
    }

    /// Runs `f` on the installed scheduler inside a critical section.
    ///
    /// Returns `None` if no scheduler is installed or the slot is already
    /// mutably borrowed (re-entrant use from within [`Self::with_mut`]).
    pub fn with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&Scheduler<M, H>) -> R,
    {
        with(|cs| self.with_cs(cs, f))
    }

    /// Runs `f` on the installed scheduler mutably inside a critical section.
    ///
    /// Returns `None` if no scheduler is installed or the slot is already
    /// borrowed.
    pub fn with_mut<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Scheduler<M, H>) -> R,
    {
        with(|cs| self.with_mut_cs(cs, f))
    }

    /// Like [`Self::with`], inside an already entered critical section.
    pub fn with_cs<F, R>(&self, cs: CriticalSection, f: F) -> Option<R>
    where
        F: FnOnce(&Scheduler<M, H>) -> R,
    {
        let slot = self.inner.borrow(cs).try_borrow().ok()?;
        slot.as_ref().map(f)
    }

    /// Like [`Self::with_mut`], inside an already entered critical section.
    pub fn with_mut_cs<F, R>(&self, cs: CriticalSection, f: F) -> Option<R>
    where
        F: FnOnce(&mut Scheduler<M, H>) -> R,
    {
        let mut slot = self.inner.borrow(cs).try_borrow_mut().ok()?;
        slot.as_mut().map(f)
    }
}

impl<M: Memory, H: MutexHooks> Default for SharedScheduler<M, H> {
    fn default() -> Self {
        Self::new()
    }
}
