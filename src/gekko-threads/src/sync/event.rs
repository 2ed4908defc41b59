//! This module provides an event that can be waited for.

#![deny(missing_docs)]

use gekko_mem::Memory;

use crate::{MutexHooks, QueueHandle, Scheduler};

/// An [`Event`], allowing to notify multiple threads that some event has happened.
///
/// An [`Event`] manages an internal flag that can be set to true with the [`Self::set()`] method
/// and reset to false with the [`Self::clear()`] method. Waiters sleep on a wait queue of the
/// scheduler region, typically one taken from [`Scheduler::wait_queue`]. The flag is set to false
/// initially.
#[derive(Debug)]
pub struct Event {
    queue: QueueHandle,
    set: bool,
}

impl Event {
    /// Creates a new **unset** [`Event`] whose waiters sleep on `queue`.
    #[must_use]
    pub const fn new(queue: QueueHandle) -> Self {
        Self { queue, set: false }
    }

    /// Creates a new **set** [`Event`].
    #[must_use]
    pub const fn new_set(queue: QueueHandle) -> Self {
        Self { queue, set: true }
    }

    /// Returns whether the [`Event`] is set.
    pub fn is_set(&self) -> bool {
        self.set
    }

    /// Returns the wait queue of this [`Event`].
    pub fn queue(&self) -> QueueHandle {
        self.queue
    }

    /// Waits for this [`Event`] to be set.
    ///
    /// Returns `true` if the event was set. Otherwise the current thread is put to sleep on the
    /// event's queue and `false` is returned; the thread should check again once it is
    /// scheduled.
    pub fn wait<M: Memory, H: MutexHooks>(&self, scheduler: &mut Scheduler<M, H>) -> bool {
        if self.set {
            return true;
        }
        scheduler.sleep(self.queue);
        false
    }

    /// Clears the event.
    ///
    /// Returns `true` if the event was set.
    pub fn clear(&mut self) -> bool {
        core::mem::replace(&mut self.set, false)
    }

    /// Sets the event, waking all waiters.
    ///
    /// If the event was already set, the function just returns.
    pub fn set<M: Memory, H: MutexHooks>(&mut self, scheduler: &mut Scheduler<M, H>) {
        if self.set {
            return;
        }
        self.set = true;
        scheduler.wakeup(self.queue);
    }
}

#[cfg(test)]
mod tests {
    use gekko_mem::Arena;

    use crate::{layout::REGION_SIZE, ThreadAttributes, ThreadState, DEFAULT_BASE};

    use super::*;

    #[test]
    fn waiters_are_released_in_priority_order() {
        let mut s: Scheduler<Arena<REGION_SIZE>> =
            Scheduler::init(Arena::big_endian(DEFAULT_BASE.get()), DEFAULT_BASE);
        let main = s.current_thread().unwrap();
        let mut event = Event::new(s.wait_queue(0).unwrap());

        let a = s.create_thread(1, 8, ThreadAttributes::DETACHED).unwrap();
        let b = s.create_thread(2, 4, ThreadAttributes::DETACHED).unwrap();

        // a runs first and blocks, then b.
        s.resume(a);
        assert_eq!(s.current_thread(), Some(a));
        assert!(!event.wait(&mut s));
        assert_eq!(s.current_thread(), Some(main));
        s.resume(b);
        assert_eq!(s.current_thread(), Some(b));
        assert!(!event.wait(&mut s));
        assert_eq!(s.current_thread(), Some(main));

        assert_eq!(s.queued_threads(event.queue()).collect::<Vec<_>>(), vec![b, a]);

        event.set(&mut s);
        assert!(event.is_set());
        assert_eq!(s.current_thread(), Some(b));
        assert_eq!(s.state(a), ThreadState::Ready);
        assert!(s.queue_head(event.queue()).is_none());

        // Set events don't block.
        assert!(event.wait(&mut s));
        assert_eq!(s.current_thread(), Some(b));

        assert!(event.clear());
        assert!(!event.clear());
    }
}
