//! Priority-based thread scheduler over a flat, handle-addressed memory region.
//!
//! Thread records, run queues, the active-thread registry and a pool of wait
//! queues live at fixed offsets inside one [`Memory`] region (see [`layout`]).
//! All relationships are 32-bit addresses into that region, `0` being null, so
//! the whole state is relocatable and can be compared byte-for-byte against a
//! memory dump taken from real hardware.
//!
//! The [`Scheduler`] only does bookkeeping: it decides which thread is
//! current. Switching execution contexts to follow that decision is up to the
//! embedder. Operations are sequential and never block the host; embedders
//! with host-level concurrency serialize access, e.g. via [`SharedScheduler`].
//!
//! ```
//! use gekko_mem::Arena;
//! use gekko_threads::{layout::REGION_SIZE, Scheduler, ThreadAttributes, DEFAULT_BASE};
//!
//! let mut s: Scheduler<Arena<REGION_SIZE>> =
//!     Scheduler::init(Arena::big_endian(DEFAULT_BASE.get()), DEFAULT_BASE);
//! let t = s.create_thread(1, 5, ThreadAttributes::DETACHED).unwrap();
//! s.resume(t);
//! assert_eq!(s.current_thread(), Some(t));
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

use core::num::NonZeroU32;

use gekko_log::{debug, trace, warn};
use gekko_mem::{Address, Memory};

mod join;
mod priority;
mod runqueue;
mod shared;
mod thread;

pub mod layout;
pub mod queue;
pub mod sync;

pub use priority::{MutexHooks, NoMutexes};
pub use runqueue::{count_leading_zeros, highest_ready_priority, portable_count_leading_zeros};
pub use shared::SharedScheduler;
pub use thread::{QueueHandle, ThreadAttributes, ThreadHandle, ThreadInfo, ThreadState};

use layout::{
    ACTIVE_QUEUE_OFFSET, DEFAULT_THREAD_PRIORITY, EXIT_VALUE_NONE, MAX_THREADS, MAX_WAIT_QUEUES,
    PRIORITY_MAX, PRIORITY_MIN, PRIORITY_SUSPENDED_WAITER, QUEUE_SIZE, REGION_SIZE,
    RUNQUEUE_OFFSET, THREADS_OFFSET, THREAD_ATTR, THREAD_BASE, THREAD_ID,
    THREAD_PRIORITY, THREAD_QUEUE, THREAD_SIZE, THREAD_STATE, THREAD_SUSPEND, THREAD_VAL,
    WAIT_QUEUES_OFFSET,
};
use queue::{ActiveLink, SchedulingLink};
use runqueue::{ready_bit, run_level};

/// Base address the scheduler region is mapped at on the console.
pub const DEFAULT_BASE: NonZeroU32 = match NonZeroU32::new(0x8030_0000) {
    Some(base) => base,
    None => panic!("base address must be non-zero"),
};

/// Scheduler state.
///
/// Owns the memory region holding all thread and queue records; nothing else
/// may mutate them.
pub struct Scheduler<M: Memory, H: MutexHooks = NoMutexes> {
    mem: M,
    hooks: H,
    base: NonZeroU32,
    /// The thread marked as running, `None` while idle.
    current_thread: Option<ThreadHandle>,
    /// Bit `31 - p` set iff run queue `p` is non-empty.
    ready_bits: u32,
    /// Set whenever the ready set may have changed.
    reschedule_hint: bool,
    /// Scheduling is disabled while this is positive.
    nesting: i32,
}

impl<M: Memory, H: MutexHooks + Default> Scheduler<M, H> {
    /// Takes ownership of `mem` and initializes the region at `base`.
    ///
    /// See [`Scheduler::reset`].
    pub fn init(mem: M, base: NonZeroU32) -> Self {
        Self::init_with_hooks(mem, base, H::default())
    }
}

impl<M: Memory, H: MutexHooks> Scheduler<M, H> {
    /// Like [`Scheduler::init`], with explicit mutex hooks.
    pub fn init_with_hooks(mem: M, base: NonZeroU32, hooks: H) -> Self {
        let mut scheduler = Self {
            mem,
            hooks,
            base,
            current_thread: None,
            ready_bits: 0,
            reschedule_hint: false,
            nesting: 0,
        };
        scheduler.reset();
        scheduler
    }

    /// (Re)initializes the region.
    ///
    /// Zeroes it, empties every queue, numbers the thread slots and installs
    /// slot 0 as the running, detached default thread at priority 16.
    pub fn reset(&mut self) {
        self.current_thread = None;
        self.ready_bits = 0;
        self.reschedule_hint = false;
        self.nesting = 0;

        self.mem.fill(self.base.get(), REGION_SIZE as u32, 0);

        for priority in PRIORITY_MIN..=PRIORITY_MAX {
            self.run_queue_at(priority).clear(&mut self.mem);
        }
        self.active_queue().clear(&mut self.mem);
        for index in 0..MAX_WAIT_QUEUES {
            self.wait_queue_at(index).clear(&mut self.mem);
        }
        for slot in 0..MAX_THREADS {
            let thread = self.thread_at(slot);
            self.mem.store_u32(thread.field(THREAD_ID), slot as u32);
        }

        let thread = self.thread_at(0);
        self.set_state(thread, ThreadState::Running);
        self.mem
            .store_u16(thread.field(THREAD_ATTR), ThreadAttributes::DETACHED.bits());
        self.set_priority(thread, DEFAULT_THREAD_PRIORITY);
        self.mem
            .store_i32(thread.field(THREAD_BASE), DEFAULT_THREAD_PRIORITY);
        self.set_suspend_count(thread, 0);
        self.mem.store_u32(thread.field(THREAD_VAL), EXIT_VALUE_NONE);
        self.set_queue(thread, None);

        self.current_thread = Some(thread);
        let active = self.active_queue();
        queue::add_tail::<ActiveLink, M>(&mut self.mem, active, thread);
        debug!("scheduler initialized at {:#x}", self.base.get());
    }

    /// Sets up thread record `slot`.
    ///
    /// The thread starts [`ThreadState::Ready`] with a suspend count of 1, so
    /// it does not run before its first [`Scheduler::resume`].
    ///
    /// Returns `None` without touching the region if `priority` is outside
    /// `0..=31` or `slot` is outside the pool.
    pub fn create_thread(
        &mut self,
        slot: usize,
        priority: i32,
        attributes: ThreadAttributes,
    ) -> Option<ThreadHandle> {
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
            warn!("rejecting thread {} with priority {}", slot, priority);
            return None;
        }
        let thread = self.thread(slot)?;

        self.set_state(thread, ThreadState::Ready);
        self.mem.store_u16(
            thread.field(THREAD_ATTR),
            attributes.intersection(ThreadAttributes::DETACHED).bits(),
        );
        self.mem.store_i32(thread.field(THREAD_BASE), priority);
        self.set_priority(thread, priority);
        self.set_suspend_count(thread, 1);
        self.mem.store_u32(thread.field(THREAD_VAL), EXIT_VALUE_NONE);
        self.set_queue(thread, None);
        self.mem.store_u32(thread.field(layout::THREAD_LINK_NEXT), 0);
        self.mem.store_u32(thread.field(layout::THREAD_LINK_PREV), 0);
        thread.join_queue().clear(&mut self.mem);

        let active = self.active_queue();
        queue::add_tail::<ActiveLink, M>(&mut self.mem, active, thread);
        debug!("created thread {} at priority {}", slot, priority);
        Some(thread)
    }

    /// Decides which thread runs next.
    ///
    /// A running current thread keeps running unless `yield_now` is set or a
    /// strictly better priority is ready; otherwise it goes back to the tail
    /// of its run queue. Then the head of the best non-empty run queue
    /// becomes current.
    ///
    /// Returns the newly selected thread, or `None` if nothing changed,
    /// scheduling is disabled, or nothing is ready (the scheduler is idle).
    pub fn select_thread(&mut self, yield_now: bool) -> Option<ThreadHandle> {
        if self.nesting > 0 {
            return None;
        }

        if let Some(current) = self.current_thread {
            if self.state(current) == ThreadState::Running {
                if !yield_now
                    && self.priority(current) <= highest_ready_priority(self.ready_bits)
                {
                    return None;
                }
                self.set_state(current, ThreadState::Ready);
                self.set_run(current);
            }
        }

        self.current_thread = None;

        if self.ready_bits == 0 {
            trace!("idle");
            return None;
        }

        self.reschedule_hint = false;

        let priority = highest_ready_priority(self.ready_bits);
        let queue = self.run_queue_at(priority);
        let next = queue::remove_head::<SchedulingLink, M>(&mut self.mem, queue)?;
        if queue.is_empty(&self.mem) {
            self.ready_bits &= !ready_bit(priority);
        }
        self.set_queue(next, None);
        self.set_state(next, ThreadState::Running);
        self.current_thread = Some(next);
        trace!("switching to thread {}", self.thread_id(next));
        Some(next)
    }

    /// Runs [`Scheduler::select_thread`] if the ready set may have changed.
    pub fn reschedule(&mut self) {
        if self.reschedule_hint {
            self.select_thread(false);
        }
    }

    /// Decrements the suspend count of `thread`, clamping at zero.
    ///
    /// When the count drops to zero the thread becomes schedulable again:
    /// a ready thread enters its run queue, a waiting thread is re-sorted in
    /// its wait queue at its recomputed priority.
    ///
    /// Returns the previous suspend count.
    pub fn resume(&mut self, thread: ThreadHandle) -> i32 {
        let count = self.suspend_count(thread);
        let remaining = count.saturating_sub(1);

        if remaining < 0 {
            self.set_suspend_count(thread, 0);
        } else {
            self.set_suspend_count(thread, remaining);
            if remaining == 0 {
                match self.state(thread) {
                    ThreadState::Ready => {
                        let priority = self.effective_priority(thread);
                        self.set_priority(thread, priority);
                        self.set_run(thread);
                    }
                    ThreadState::Waiting => {
                        if let Some(queue) = self.queue_of(thread) {
                            queue::remove_item::<SchedulingLink, M>(&mut self.mem, queue, thread);
                            let priority = self.effective_priority(thread);
                            self.set_priority(thread, priority);
                            queue::add_priority::<SchedulingLink, M>(&mut self.mem, queue, thread);
                        } else {
                            let priority = self.effective_priority(thread);
                            self.set_priority(thread, priority);
                        }
                        self.update_blocking_owner(thread);
                    }
                    _ => {}
                }
                self.reschedule();
            }
        }
        count
    }

    /// Increments the suspend count of `thread`.
    ///
    /// On the first suspension a running thread is marked ready (it stops
    /// running at the next selection), a ready thread leaves its run queue,
    /// and a waiting thread moves to the tail of its wait queue with the
    /// worst possible priority.
    ///
    /// Returns the previous suspend count.
    pub fn suspend(&mut self, thread: ThreadHandle) -> i32 {
        let count = self.suspend_count(thread);
        self.set_suspend_count(thread, count.saturating_add(1));

        if count == 0 {
            match self.state(thread) {
                ThreadState::Running => {
                    self.reschedule_hint = true;
                    self.set_state(thread, ThreadState::Ready);
                }
                ThreadState::Ready => self.unset_run(thread),
                ThreadState::Waiting => {
                    if let Some(queue) = self.queue_of(thread) {
                        queue::remove_item::<SchedulingLink, M>(&mut self.mem, queue, thread);
                        self.set_priority(thread, PRIORITY_SUSPENDED_WAITER);
                        queue::add_tail::<SchedulingLink, M>(&mut self.mem, queue, thread);
                    } else {
                        self.set_priority(thread, PRIORITY_SUSPENDED_WAITER);
                    }
                    self.update_blocking_owner(thread);
                }
                _ => {}
            }
            self.reschedule();
        }
        count
    }

    /// Puts the current thread to sleep on `queue`.
    ///
    /// The thread is inserted by priority and another thread is selected.
    /// Logically the caller only continues once woken up and rescheduled.
    pub fn sleep(&mut self, queue: QueueHandle) {
        let Some(current) = self.current_thread else {
            warn!("sleep without a current thread");
            return;
        };

        self.set_state(current, ThreadState::Waiting);
        self.set_queue(current, Some(queue));
        queue::add_priority::<SchedulingLink, M>(&mut self.mem, queue, current);
        self.reschedule_hint = true;
        self.reschedule();
    }

    /// Wakes every thread sleeping on `queue`, in queue order.
    ///
    /// Woken threads become ready; those not suspended enter their run queue.
    pub fn wakeup(&mut self, queue: QueueHandle) {
        while let Some(thread) = queue::remove_head::<SchedulingLink, M>(&mut self.mem, queue) {
            self.set_queue(thread, None);
            self.set_state(thread, ThreadState::Ready);
            if !self.is_suspended(thread) {
                self.set_run(thread);
            }
        }
        self.reschedule();
    }

    /// Gives up the processor to the best ready thread, including threads
    /// of the same priority as the current one.
    pub fn yield_now(&mut self) -> Option<ThreadHandle> {
        self.select_thread(true)
    }

    /// Terminates `thread`.
    ///
    /// Detached threads are recycled immediately, joinable ones become
    /// [`ThreadState::Moribund`]. Joiners are woken either way. Does nothing
    /// for threads that are inactive or already moribund.
    pub fn cancel(&mut self, thread: ThreadHandle) {
        match self.state(thread) {
            ThreadState::Ready => {
                if !self.is_suspended(thread) {
                    self.unset_run(thread);
                }
            }
            ThreadState::Running => self.reschedule_hint = true,
            ThreadState::Waiting => {
                if let Some(queue) = self.queue_of(thread) {
                    queue::remove_item::<SchedulingLink, M>(&mut self.mem, queue, thread);
                }
                self.set_queue(thread, None);
                if !self.is_suspended(thread) {
                    self.update_blocking_owner(thread);
                }
            }
            ThreadState::Inactive | ThreadState::Moribund => return,
        }

        debug!("cancelling thread {}", self.thread_id(thread));
        self.retire(thread, None);
        self.release_mutexes(thread);
        self.wakeup(thread.join_queue());
        self.reschedule();
    }

    /// Terminates the current thread with exit value `value`.
    ///
    /// The value is kept for joiners of joinable threads. Another ready
    /// thread is selected, or the scheduler goes idle.
    pub fn exit(&mut self, value: u32) {
        let Some(current) = self.current_thread else {
            warn!("exit without a current thread");
            return;
        };

        debug!("thread {} exiting", self.thread_id(current));
        self.retire(current, Some(value));
        self.release_mutexes(current);
        self.wakeup(current.join_queue());
        self.reschedule_hint = true;
        self.select_thread(false);
    }

    /// Disables scheduling decisions. Nests; returns the previous nesting level.
    pub fn disable_scheduler(&mut self) -> i32 {
        let previous = self.nesting;
        self.nesting = previous.wrapping_add(1);
        previous
    }

    /// Undoes one [`Scheduler::disable_scheduler`]. Returns the previous nesting level.
    ///
    /// Does not reschedule by itself; call [`Scheduler::reschedule`] if needed.
    pub fn enable_scheduler(&mut self) -> i32 {
        let previous = self.nesting;
        self.nesting = previous.wrapping_sub(1);
        previous
    }

    /// Detached threads leave the active registry and become inactive,
    /// joinable ones turn moribund and keep `exit_value` if given.
    fn retire(&mut self, thread: ThreadHandle, exit_value: Option<u32>) {
        if self.attributes(thread).contains(ThreadAttributes::DETACHED) {
            let active = self.active_queue();
            queue::remove_item::<ActiveLink, M>(&mut self.mem, active, thread);
            self.set_state(thread, ThreadState::Inactive);
        } else {
            self.set_state(thread, ThreadState::Moribund);
            if let Some(value) = exit_value {
                self.mem.store_u32(thread.field(THREAD_VAL), value);
            }
        }
    }

    // Inspection.

    /// Returns the thread currently marked as running.
    pub fn current_thread(&self) -> Option<ThreadHandle> {
        self.current_thread
    }

    /// Returns the ready bitmap.
    pub fn ready_bits(&self) -> u32 {
        self.ready_bits
    }

    /// Returns `true` if a scheduling decision is pending.
    pub fn reschedule_hint(&self) -> bool {
        self.reschedule_hint
    }

    /// Returns the scheduler disable nesting level.
    pub fn scheduler_nesting(&self) -> i32 {
        self.nesting
    }

    /// Returns the base address of the region.
    pub fn base(&self) -> NonZeroU32 {
        self.base
    }

    /// Returns the backing memory.
    pub fn memory(&self) -> &M {
        &self.mem
    }

    /// Returns the mutex hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Returns the mutex hooks mutably.
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Returns the record of pool slot `slot`.
    pub fn thread(&self, slot: usize) -> Option<ThreadHandle> {
        (slot < MAX_THREADS).then(|| self.thread_at(slot))
    }

    /// Returns wait queue `index` of the pool.
    pub fn wait_queue(&self, index: usize) -> Option<QueueHandle> {
        (index < MAX_WAIT_QUEUES).then(|| self.wait_queue_at(index))
    }

    /// Returns the run queue of `priority`.
    pub fn run_queue(&self, priority: i32) -> Option<QueueHandle> {
        (PRIORITY_MIN..=PRIORITY_MAX)
            .contains(&priority)
            .then(|| self.run_queue_at(priority))
    }

    /// Returns the registry of live threads.
    pub fn active_queue(&self) -> QueueHandle {
        QueueHandle::at(self.addr(ACTIVE_QUEUE_OFFSET))
    }

    /// Returns the queue of threads waiting for `thread` to finish.
    pub fn join_queue(&self, thread: ThreadHandle) -> QueueHandle {
        thread.join_queue()
    }

    /// Returns the first thread of `queue`.
    pub fn queue_head(&self, queue: QueueHandle) -> Option<ThreadHandle> {
        queue.head(&self.mem)
    }

    /// Returns the last thread of `queue`.
    pub fn queue_tail(&self, queue: QueueHandle) -> Option<ThreadHandle> {
        queue.tail(&self.mem)
    }

    /// Iterates over the threads linked into `queue` (run, wait or join queue).
    pub fn queued_threads(&self, queue: QueueHandle) -> queue::Iter<'_, SchedulingLink, M> {
        queue::iter::<SchedulingLink, M>(&self.mem, queue)
    }

    /// Iterates over all live threads in creation order.
    pub fn active_threads(&self) -> queue::Iter<'_, ActiveLink, M> {
        queue::iter::<ActiveLink, M>(&self.mem, self.active_queue())
    }

    /// Returns a snapshot of the record of `thread`.
    pub fn thread_info(&self, thread: ThreadHandle) -> ThreadInfo {
        ThreadInfo {
            id: self.thread_id(thread),
            state: self.state(thread),
            attributes: self.attributes(thread),
            suspend_count: self.suspend_count(thread),
            priority: self.priority(thread),
            base_priority: self.base_priority(thread),
            exit_value: self.exit_value(thread),
            queue: self.queue_of(thread),
        }
    }

    /// Returns the pool slot index of `thread`.
    pub fn thread_id(&self, thread: ThreadHandle) -> u32 {
        self.mem.load_u32(thread.field(THREAD_ID))
    }

    /// Returns the state of `thread`.
    pub fn state(&self, thread: ThreadHandle) -> ThreadState {
        ThreadState::from_raw(self.mem.load_u16(thread.field(THREAD_STATE)))
    }

    /// Returns the attributes of `thread`.
    pub fn attributes(&self, thread: ThreadHandle) -> ThreadAttributes {
        ThreadAttributes::from_bits_truncate(self.mem.load_u16(thread.field(THREAD_ATTR)))
    }

    /// Returns how often `thread` has been suspended without a matching resume.
    pub fn suspend_count(&self, thread: ThreadHandle) -> i32 {
        self.mem.load_i32(thread.field(THREAD_SUSPEND))
    }

    /// Returns `true` if the suspend count of `thread` is positive.
    pub fn is_suspended(&self, thread: ThreadHandle) -> bool {
        self.suspend_count(thread) > 0
    }

    /// Returns `true` for inactive and moribund threads.
    pub fn is_terminated(&self, thread: ThreadHandle) -> bool {
        matches!(
            self.state(thread),
            ThreadState::Inactive | ThreadState::Moribund
        )
    }

    /// Effective priority as stored in the record.
    pub fn priority(&self, thread: ThreadHandle) -> i32 {
        self.mem.load_i32(thread.field(THREAD_PRIORITY))
    }

    /// Priority `thread` was created with.
    pub fn base_priority(&self, thread: ThreadHandle) -> i32 {
        self.mem.load_i32(thread.field(THREAD_BASE))
    }

    /// Returns the exit value, [`layout::EXIT_VALUE_NONE`] until the thread exits.
    pub fn exit_value(&self, thread: ThreadHandle) -> u32 {
        self.mem.load_u32(thread.field(THREAD_VAL))
    }

    /// Returns the queue `thread` is linked into through its scheduling link.
    pub fn queue_of(&self, thread: ThreadHandle) -> Option<QueueHandle> {
        QueueHandle::from_raw(self.mem.load_u32(thread.field(THREAD_QUEUE)))
    }

    // Raw field and address helpers.

    fn set_state(&mut self, thread: ThreadHandle, state: ThreadState) {
        self.mem.store_u16(thread.field(THREAD_STATE), state.to_raw());
    }

    fn set_suspend_count(&mut self, thread: ThreadHandle, count: i32) {
        self.mem.store_i32(thread.field(THREAD_SUSPEND), count);
    }

    pub(crate) fn set_priority(&mut self, thread: ThreadHandle, priority: i32) {
        self.mem.store_i32(thread.field(THREAD_PRIORITY), priority);
    }

    pub(crate) fn set_queue(&mut self, thread: ThreadHandle, queue: Option<QueueHandle>) {
        self.mem
            .store_u32(thread.field(THREAD_QUEUE), queue.map_or(0, QueueHandle::addr));
    }

    fn addr(&self, offset: u32) -> NonZeroU32 {
        self.base.saturating_add(offset)
    }

    fn thread_at(&self, slot: usize) -> ThreadHandle {
        ThreadHandle::at(self.addr(THREADS_OFFSET + slot as u32 * THREAD_SIZE))
    }

    fn wait_queue_at(&self, index: usize) -> QueueHandle {
        QueueHandle::at(self.addr(WAIT_QUEUES_OFFSET + index as u32 * QUEUE_SIZE))
    }

    pub(crate) fn run_queue_at(&self, priority: i32) -> QueueHandle {
        let level = run_level(priority) as u32;
        QueueHandle::at(self.addr(RUNQUEUE_OFFSET + level * QUEUE_SIZE))
    }
}

impl<M: Memory, H: MutexHooks> core::fmt::Debug for Scheduler<M, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("base", &Address::from(self.base))
            .field("current_thread", &self.current_thread)
            .field("ready_bits", &self.ready_bits)
            .field("reschedule_hint", &self.reschedule_hint)
            .field("nesting", &self.nesting)
            .finish_non_exhaustive()
    }
}
