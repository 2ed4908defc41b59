//! Condition variables.

use core::num::NonZeroU32;

use gekko_mem::Memory;

use crate::{
    layout::{CONDS_OFFSET, COND_QUEUE, COND_SIZE, MAX_CONDS},
    MutexHooks, QueueHandle, Scheduler,
};

/// A condition variable: a wait queue stored in the cond area of the region.
///
/// [`Self::signal`] wakes every waiter; waiters re-check their condition once
/// scheduled. There is no mutex hand-off.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cond(QueueHandle);

impl Cond {
    /// Returns the wait queue of this condition variable.
    pub fn queue(self) -> QueueHandle {
        self.0
    }

    /// Empties the wait queue. No thread may be waiting.
    pub fn init<M: Memory, H: MutexHooks>(self, scheduler: &mut Scheduler<M, H>) {
        self.0.clear(&mut scheduler.mem);
    }

    /// Puts the current thread to sleep until the next [`Self::signal`].
    pub fn wait<M: Memory, H: MutexHooks>(self, scheduler: &mut Scheduler<M, H>) {
        scheduler.sleep(self.0);
    }

    /// Wakes all waiters.
    pub fn signal<M: Memory, H: MutexHooks>(self, scheduler: &mut Scheduler<M, H>) {
        scheduler.wakeup(self.0);
    }
}

impl<M: Memory, H: MutexHooks> Scheduler<M, H> {
    /// Returns condition variable `index` of the pool.
    pub fn cond(&self, index: usize) -> Option<Cond> {
        (index < MAX_CONDS).then(|| {
            let addr: NonZeroU32 = self.addr(CONDS_OFFSET + index as u32 * COND_SIZE);
            Cond(QueueHandle::at(addr.saturating_add(COND_QUEUE)))
        })
    }
}

#[cfg(test)]
mod tests {
    use gekko_mem::Arena;

    use crate::{layout::REGION_SIZE, ThreadAttributes, ThreadState, DEFAULT_BASE};

    use super::*;

    #[test]
    fn signal_wakes_all_waiters_by_priority() {
        let mut s: Scheduler<Arena<REGION_SIZE>> =
            Scheduler::init(Arena::big_endian(DEFAULT_BASE.get()), DEFAULT_BASE);
        let main = s.current_thread().unwrap();
        let cond = s.cond(3).unwrap();
        assert_eq!(cond.queue().addr(), DEFAULT_BASE.get() + 2824 + 3 * 8);
        assert!(s.cond(MAX_CONDS).is_none());
        cond.init(&mut s);

        let low = s.create_thread(1, 12, ThreadAttributes::DETACHED).unwrap();
        let high = s.create_thread(2, 6, ThreadAttributes::DETACHED).unwrap();
        for t in [low, high] {
            s.resume(t);
            assert_eq!(s.current_thread(), Some(t));
            cond.wait(&mut s);
            assert_eq!(s.state(t), ThreadState::Waiting);
        }
        assert_eq!(s.current_thread(), Some(main));
        assert_eq!(s.queued_threads(cond.queue()).collect::<Vec<_>>(), vec![high, low]);

        cond.signal(&mut s);
        assert!(s.queue_head(cond.queue()).is_none());
        assert_eq!(s.current_thread(), Some(high));
        assert_eq!(s.queue_of(low), s.run_queue(12));

        // Signalling with no waiters changes nothing.
        let before = s.memory().clone();
        cond.signal(&mut s);
        assert_eq!(s.memory(), &before);
    }
}
