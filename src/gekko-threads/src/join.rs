use gekko_log::debug;
use gekko_mem::Memory;

use crate::{
    queue::{self, ActiveLink},
    MutexHooks, Scheduler, ThreadAttributes, ThreadHandle, ThreadState,
};

impl<M: Memory, H: MutexHooks> Scheduler<M, H> {
    /// Reaps a finished joinable thread without blocking.
    ///
    /// Returns its exit value and recycles the record if `thread` is
    /// moribund. Returns `None` for detached threads and for threads that have
    /// not finished yet; a caller that wants to wait can [`Scheduler::sleep`]
    /// on [`Scheduler::join_queue`] and retry once woken.
    pub fn join(&mut self, thread: ThreadHandle) -> Option<u32> {
        if self.attributes(thread).contains(ThreadAttributes::DETACHED) {
            return None;
        }
        if self.state(thread) != ThreadState::Moribund {
            return None;
        }

        let value = self.exit_value(thread);
        let active = self.active_queue();
        queue::remove_item::<ActiveLink, M>(&mut self.mem, active, thread);
        self.set_state(thread, ThreadState::Inactive);
        debug!("joined thread {}", self.thread_id(thread));
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use gekko_mem::Arena;

    use crate::{layout::REGION_SIZE, DEFAULT_BASE};

    use super::*;

    fn scheduler() -> Scheduler<Arena<REGION_SIZE>> {
        Scheduler::init(Arena::big_endian(DEFAULT_BASE.get()), DEFAULT_BASE)
    }

    #[test]
    fn join_collects_exit_value() {
        let mut s = scheduler();
        let main = s.current_thread().unwrap();
        let worker = s.create_thread(1, 4, ThreadAttributes::empty()).unwrap();

        s.resume(worker);
        assert_eq!(s.current_thread(), Some(worker));
        // Not finished yet.
        assert_eq!(s.join(worker), None);

        s.exit(0xdead_beef);
        assert_eq!(s.current_thread(), Some(main));
        assert_eq!(s.state(worker), ThreadState::Moribund);
        assert!(s.active_threads().any(|t| t == worker));

        assert_eq!(s.join(worker), Some(0xdead_beef));
        assert_eq!(s.state(worker), ThreadState::Inactive);
        assert!(!s.active_threads().any(|t| t == worker));
        // Already reaped.
        assert_eq!(s.join(worker), None);
    }

    #[test]
    fn detached_threads_cannot_be_joined() {
        let mut s = scheduler();
        let worker = s.create_thread(1, 4, ThreadAttributes::DETACHED).unwrap();
        s.cancel(worker);
        assert_eq!(s.state(worker), ThreadState::Inactive);
        assert_eq!(s.join(worker), None);
    }

    #[test]
    fn joiner_is_woken_by_exit() {
        let mut s = scheduler();
        let main = s.current_thread().unwrap();
        let worker = s.create_thread(1, 20, ThreadAttributes::empty()).unwrap();
        s.resume(worker);

        // main waits for the worker, which then runs and exits.
        s.sleep(s.join_queue(worker));
        assert_eq!(s.current_thread(), Some(worker));
        assert_eq!(s.state(main), ThreadState::Waiting);

        s.exit(7);
        assert_eq!(s.current_thread(), Some(main));
        assert_eq!(s.join(worker), Some(7));
    }
}
