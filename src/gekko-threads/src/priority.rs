//! Effective priority and the mutex extension point.
//!
//! Without a mutex subsystem a thread's effective priority always equals its
//! base priority. [`MutexHooks`] is where one plugs in: it can raise the
//! effective priority of owners, name the owner a waiter is blocked on (so
//! priority changes propagate along the ownership chain), and hand back the
//! wait queues of mutexes to release when a thread terminates.

use gekko_mem::Memory;

use crate::{
    queue::{self, SchedulingLink},
    QueueHandle, Scheduler, ThreadHandle, ThreadState,
};

/// Mutex bookkeeping consulted by the scheduler.
///
/// Every method has a default matching "no mutexes exist".
pub trait MutexHooks {
    /// Computes the effective priority of `thread`, given its base priority.
    fn effective_priority<M: Memory + ?Sized>(
        &self,
        _mem: &M,
        _thread: ThreadHandle,
        base: i32,
    ) -> i32 {
        base
    }

    /// Returns the owner of the mutex `thread` is blocked on.
    fn blocking_owner<M: Memory + ?Sized>(
        &self,
        _mem: &M,
        _thread: ThreadHandle,
    ) -> Option<ThreadHandle> {
        None
    }

    /// Releases one mutex held by `thread` and returns its wait queue.
    ///
    /// Called repeatedly when `thread` is cancelled or exits, until it returns `None`.
    fn release_next<M: Memory + ?Sized>(
        &mut self,
        _mem: &mut M,
        _thread: ThreadHandle,
    ) -> Option<QueueHandle> {
        None
    }
}

/// The default: no mutex subsystem.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoMutexes;

impl MutexHooks for NoMutexes {}

impl<M: Memory, H: MutexHooks> Scheduler<M, H> {
    /// Returns the priority `thread` should currently run at.
    pub fn effective_priority(&self, thread: ThreadHandle) -> i32 {
        let base = self.base_priority(thread);
        self.hooks.effective_priority(&self.mem, thread, base)
    }

    /// Changes the effective priority of `thread`, keeping whatever queue it
    /// is in sorted.
    ///
    /// Returns the next thread whose priority may need updating: the owner of
    /// the mutex a waiting thread is blocked on.
    pub fn set_effective_priority(
        &mut self,
        thread: ThreadHandle,
        priority: i32,
    ) -> Option<ThreadHandle> {
        match self.state(thread) {
            ThreadState::Ready => {
                self.unset_run(thread);
                self.set_priority(thread, priority);
                self.set_run(thread);
                None
            }
            ThreadState::Waiting => {
                let queue = self.queue_of(thread);
                if let Some(queue) = queue {
                    queue::remove_item::<SchedulingLink, M>(&mut self.mem, queue, thread);
                }
                self.set_priority(thread, priority);
                if let Some(queue) = queue {
                    queue::add_priority::<SchedulingLink, M>(&mut self.mem, queue, thread);
                }
                self.hooks.blocking_owner(&self.mem, thread)
            }
            ThreadState::Running => {
                self.reschedule_hint = true;
                self.set_priority(thread, priority);
                None
            }
            ThreadState::Inactive | ThreadState::Moribund => None,
        }
    }

    /// Brings the effective priority of `thread` up to date, then follows the
    /// chain of blocking owners while priorities keep changing.
    ///
    /// Suspended threads are left alone; they are re-evaluated on resume.
    pub fn update_priority(&mut self, thread: ThreadHandle) {
        let mut cursor = Some(thread);
        while let Some(thread) = cursor {
            if self.suspend_count(thread) > 0 {
                break;
            }
            let priority = self.effective_priority(thread);
            if self.priority(thread) == priority {
                break;
            }
            cursor = self.set_effective_priority(thread, priority);
        }
    }

    pub(crate) fn update_blocking_owner(&mut self, thread: ThreadHandle) {
        if let Some(owner) = self.hooks.blocking_owner(&self.mem, thread) {
            self.update_priority(owner);
        }
    }

    pub(crate) fn release_mutexes(&mut self, thread: ThreadHandle) {
        while let Some(queue) = self.hooks.release_next(&mut self.mem, thread) {
            self.wakeup(queue);
        }
    }
}
