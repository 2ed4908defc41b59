//! Bounded message queues for passing 32-bit messages between threads.

#![deny(missing_docs)]

use core::num::NonZeroU32;

use gekko_log::{trace, warn};
use gekko_mem::{Address, Memory};

use crate::{
    layout::{
        MAX_MESSAGES_PER_QUEUE, MAX_MESSAGE_QUEUES, MESSAGE_QUEUES_OFFSET, MESSAGE_QUEUE_COUNT,
        MESSAGE_QUEUE_FIRST, MESSAGE_QUEUE_MESSAGES, MESSAGE_QUEUE_RECEIVE, MESSAGE_QUEUE_SEND,
        MESSAGE_QUEUE_SIZE, MESSAGE_QUEUE_USED,
    },
    MutexHooks, QueueHandle, Scheduler,
};

/// A ring buffer of up to [`MAX_MESSAGES_PER_QUEUE`] messages stored in the
/// scheduler region.
///
/// Senders that find the queue full sleep on its send queue, receivers that
/// find it empty sleep on its receive queue. A successful send or jam wakes
/// all receivers, a successful receive wakes all senders; woken threads retry
/// once they are scheduled again.
///
/// The plain methods ([`Self::send`], [`Self::jam`], [`Self::recv`]) block the
/// current thread when they cannot complete, the `try_` variants fail instead.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageQueue(NonZeroU32);

#[derive(Copy, Clone)]
enum End {
    Back,
    Front,
}

impl MessageQueue {
    /// Returns the address of the record.
    pub const fn addr(self) -> Address {
        self.0.get()
    }

    /// Returns the queue of threads waiting for free space.
    pub fn send_queue(self) -> QueueHandle {
        QueueHandle::at(self.0.saturating_add(MESSAGE_QUEUE_SEND))
    }

    /// Returns the queue of threads waiting for messages.
    pub fn receive_queue(self) -> QueueHandle {
        QueueHandle::at(self.0.saturating_add(MESSAGE_QUEUE_RECEIVE))
    }

    fn field(self, offset: u32) -> Address {
        self.0.get().wrapping_add(offset)
    }

    fn slot(self, index: i32) -> Address {
        self.field(MESSAGE_QUEUE_MESSAGES.wrapping_add((index as u32).wrapping_mul(4)))
    }

    /// Empties the queue and sets its capacity.
    ///
    /// Both wait queues are reset, so no thread may be waiting on the queue.
    /// Returns `false` without touching the record if `capacity` is zero or
    /// exceeds [`MAX_MESSAGES_PER_QUEUE`].
    pub fn init<M: Memory, H: MutexHooks>(
        self,
        scheduler: &mut Scheduler<M, H>,
        capacity: usize,
    ) -> bool {
        if !(1..=MAX_MESSAGES_PER_QUEUE).contains(&capacity) {
            warn!("rejecting message queue capacity {}", capacity);
            return false;
        }
        let mem = &mut scheduler.mem;
        self.send_queue().clear(mem);
        self.receive_queue().clear(mem);
        mem.store_i32(self.field(MESSAGE_QUEUE_COUNT), capacity as i32);
        mem.store_i32(self.field(MESSAGE_QUEUE_FIRST), 0);
        mem.store_i32(self.field(MESSAGE_QUEUE_USED), 0);
        for index in 0..MAX_MESSAGES_PER_QUEUE as i32 {
            mem.store_u32(self.slot(index), 0);
        }
        true
    }

    /// Returns the capacity set by [`Self::init`].
    pub fn capacity<M: Memory, H: MutexHooks>(self, scheduler: &Scheduler<M, H>) -> usize {
        usize::try_from(scheduler.mem.load_i32(self.field(MESSAGE_QUEUE_COUNT))).unwrap_or(0)
    }

    /// Returns the number of queued messages.
    pub fn len<M: Memory, H: MutexHooks>(self, scheduler: &Scheduler<M, H>) -> usize {
        usize::try_from(scheduler.mem.load_i32(self.field(MESSAGE_QUEUE_USED))).unwrap_or(0)
    }

    /// Returns `true` if no message is queued.
    pub fn is_empty<M: Memory, H: MutexHooks>(self, scheduler: &Scheduler<M, H>) -> bool {
        self.len(scheduler) == 0
    }

    /// Appends `msg`, sleeping on the send queue if the queue is full.
    ///
    /// Returns `true` if the message was queued. On `false` the current
    /// thread has been put to sleep and should send again once woken.
    pub fn send<M: Memory, H: MutexHooks>(self, scheduler: &mut Scheduler<M, H>, msg: u32) -> bool {
        self.put(scheduler, msg, End::Back, true)
    }

    /// Appends `msg` if there is room.
    pub fn try_send<M: Memory, H: MutexHooks>(
        self,
        scheduler: &mut Scheduler<M, H>,
        msg: u32,
    ) -> bool {
        self.put(scheduler, msg, End::Back, false)
    }

    /// Puts `msg` in front of all queued messages, sleeping on the send queue
    /// if the queue is full.
    pub fn jam<M: Memory, H: MutexHooks>(self, scheduler: &mut Scheduler<M, H>, msg: u32) -> bool {
        self.put(scheduler, msg, End::Front, true)
    }

    /// Puts `msg` in front of all queued messages if there is room.
    pub fn try_jam<M: Memory, H: MutexHooks>(
        self,
        scheduler: &mut Scheduler<M, H>,
        msg: u32,
    ) -> bool {
        self.put(scheduler, msg, End::Front, false)
    }

    /// Takes the first message, sleeping on the receive queue if there is
    /// none.
    ///
    /// On `None` the current thread has been put to sleep and should receive
    /// again once woken.
    pub fn recv<M: Memory, H: MutexHooks>(self, scheduler: &mut Scheduler<M, H>) -> Option<u32> {
        self.take(scheduler, true)
    }

    /// Takes the first message, if any.
    pub fn try_recv<M: Memory, H: MutexHooks>(
        self,
        scheduler: &mut Scheduler<M, H>,
    ) -> Option<u32> {
        self.take(scheduler, false)
    }

    fn put<M: Memory, H: MutexHooks>(
        self,
        scheduler: &mut Scheduler<M, H>,
        msg: u32,
        end: End,
        block: bool,
    ) -> bool {
        let mem = &mut scheduler.mem;
        let count = mem.load_i32(self.field(MESSAGE_QUEUE_COUNT));
        let used = mem.load_i32(self.field(MESSAGE_QUEUE_USED));

        if count <= used {
            if block {
                trace!("message queue {:#x} full, sleeping", self.addr());
                scheduler.sleep(self.send_queue());
            }
            return false;
        }

        let first = mem.load_i32(self.field(MESSAGE_QUEUE_FIRST));
        let index = match end {
            End::Back => wrap(first.wrapping_add(used), count),
            End::Front => {
                let index = wrap(first.wrapping_add(count).wrapping_sub(1), count);
                mem.store_i32(self.field(MESSAGE_QUEUE_FIRST), index);
                index
            }
        };
        mem.store_u32(self.slot(index), msg);
        mem.store_i32(self.field(MESSAGE_QUEUE_USED), used.wrapping_add(1));

        scheduler.wakeup(self.receive_queue());
        true
    }

    fn take<M: Memory, H: MutexHooks>(
        self,
        scheduler: &mut Scheduler<M, H>,
        block: bool,
    ) -> Option<u32> {
        let mem = &mut scheduler.mem;
        let used = mem.load_i32(self.field(MESSAGE_QUEUE_USED));

        if used <= 0 {
            if block {
                trace!("message queue {:#x} empty, sleeping", self.addr());
                scheduler.sleep(self.receive_queue());
            }
            return None;
        }

        let count = mem.load_i32(self.field(MESSAGE_QUEUE_COUNT));
        let first = mem.load_i32(self.field(MESSAGE_QUEUE_FIRST));
        let msg = mem.load_u32(self.slot(first));
        mem.store_i32(
            self.field(MESSAGE_QUEUE_FIRST),
            wrap(first.wrapping_add(1), count),
        );
        mem.store_i32(self.field(MESSAGE_QUEUE_USED), used.wrapping_sub(1));

        scheduler.wakeup(self.send_queue());
        Some(msg)
    }
}

/// Ring index arithmetic; a zero capacity maps everything to slot 0.
fn wrap(index: i32, count: i32) -> i32 {
    index.checked_rem_euclid(count).unwrap_or(0)
}

impl<M: Memory, H: MutexHooks> Scheduler<M, H> {
    /// Returns message queue `index` of the pool.
    pub fn message_queue(&self, index: usize) -> Option<MessageQueue> {
        (index < MAX_MESSAGE_QUEUES).then(|| {
            MessageQueue(
                self.addr(MESSAGE_QUEUES_OFFSET + index as u32 * MESSAGE_QUEUE_SIZE),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use gekko_mem::Arena;

    use crate::{layout::REGION_SIZE, ThreadAttributes, ThreadState, DEFAULT_BASE};

    use super::*;

    type Sched = Scheduler<Arena<REGION_SIZE>>;

    fn scheduler() -> Sched {
        Scheduler::init(Arena::big_endian(DEFAULT_BASE.get()), DEFAULT_BASE)
    }

    fn drain(s: &mut Sched, mq: MessageQueue) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(msg) = mq.try_recv(s) {
            out.push(msg);
        }
        out
    }

    #[test]
    fn jam_goes_in_front_of_sent_messages() {
        let mut s = scheduler();
        let mq = s.message_queue(0).unwrap();
        assert!(mq.init(&mut s, 4));

        assert!(mq.try_send(&mut s, 1));
        assert!(mq.try_send(&mut s, 2));
        assert!(mq.try_jam(&mut s, 3));
        assert!(mq.try_jam(&mut s, 4));
        assert_eq!(mq.len(&s), 4);

        assert_eq!(drain(&mut s, mq), vec![4, 3, 1, 2]);
        assert!(mq.is_empty(&s));
    }

    #[test]
    fn ring_wraps_around() {
        let mut s = scheduler();
        let mq = s.message_queue(7).unwrap();
        assert!(mq.init(&mut s, 3));
        assert_eq!(mq.capacity(&s), 3);

        for round in 0..10 {
            assert!(mq.try_send(&mut s, round));
            assert!(mq.try_send(&mut s, round + 100));
            assert_eq!(mq.try_recv(&mut s), Some(round));
            assert_eq!(mq.try_recv(&mut s), Some(round + 100));
        }

        // Jamming into an empty ring starting mid-buffer.
        assert!(mq.try_send(&mut s, 1));
        assert_eq!(mq.try_recv(&mut s), Some(1));
        assert!(mq.try_jam(&mut s, 2));
        assert!(mq.try_send(&mut s, 3));
        assert!(mq.try_jam(&mut s, 1));
        assert_eq!(drain(&mut s, mq), vec![1, 2, 3]);
    }

    #[test]
    fn full_and_empty_fail_without_blocking() {
        let mut s = scheduler();
        let main = s.current_thread().unwrap();
        let mq = s.message_queue(1).unwrap();
        assert!(mq.init(&mut s, 2));

        let empty = s.memory().clone();
        assert_eq!(mq.try_recv(&mut s), None);
        assert_eq!(s.memory(), &empty);

        assert!(mq.try_send(&mut s, 10));
        assert!(mq.try_jam(&mut s, 20));
        let full = s.memory().clone();
        assert!(!mq.try_send(&mut s, 30));
        assert!(!mq.try_jam(&mut s, 30));
        assert_eq!(s.memory(), &full);

        assert_eq!(s.current_thread(), Some(main));
        assert_eq!(s.state(main), ThreadState::Running);
        assert_eq!(drain(&mut s, mq), vec![20, 10]);
    }

    #[test]
    fn init_rejects_bad_capacity() {
        let mut s = scheduler();
        let mq = s.message_queue(0).unwrap();
        let before = s.memory().clone();
        assert!(!mq.init(&mut s, 0));
        assert!(!mq.init(&mut s, MAX_MESSAGES_PER_QUEUE + 1));
        assert_eq!(s.memory(), &before);
        assert!(s.message_queue(MAX_MESSAGE_QUEUES).is_none());

        // An uninitialized queue is both full and empty.
        assert!(!mq.try_send(&mut s, 1));
        assert_eq!(mq.try_recv(&mut s), None);
    }

    #[test]
    fn blocking_receive_sleeps_until_send() {
        let mut s = scheduler();
        let main = s.current_thread().unwrap();
        let mq = s.message_queue(2).unwrap();
        assert!(mq.init(&mut s, 2));
        let receiver = s.create_thread(1, 4, ThreadAttributes::DETACHED).unwrap();

        s.resume(receiver);
        assert_eq!(s.current_thread(), Some(receiver));
        assert_eq!(mq.recv(&mut s), None);
        assert_eq!(s.state(receiver), ThreadState::Waiting);
        assert_eq!(s.queue_of(receiver), Some(mq.receive_queue()));
        assert_eq!(s.current_thread(), Some(main));

        assert!(mq.send(&mut s, 0xABCD));
        assert!(s.queue_head(mq.receive_queue()).is_none());
        assert_eq!(s.current_thread(), Some(receiver));
        assert_eq!(mq.recv(&mut s), Some(0xABCD));
        assert!(mq.is_empty(&s));
    }

    #[test]
    fn blocking_send_sleeps_until_receive() {
        let mut s = scheduler();
        let main = s.current_thread().unwrap();
        let mq = s.message_queue(3).unwrap();
        assert!(mq.init(&mut s, 1));
        assert!(mq.try_send(&mut s, 1));
        let sender = s.create_thread(1, 4, ThreadAttributes::DETACHED).unwrap();

        s.resume(sender);
        assert_eq!(s.current_thread(), Some(sender));
        assert!(!mq.jam(&mut s, 2));
        assert_eq!(s.state(sender), ThreadState::Waiting);
        assert_eq!(s.queue_of(sender), Some(mq.send_queue()));
        assert_eq!(s.current_thread(), Some(main));

        assert_eq!(mq.try_recv(&mut s), Some(1));
        assert_eq!(s.current_thread(), Some(sender));
        assert!(mq.jam(&mut s, 2));
        assert_eq!(mq.try_recv(&mut s), Some(2));
    }

    #[test]
    fn record_layout() {
        let mut s = scheduler();
        let mq = s.message_queue(1).unwrap();
        assert_eq!(mq.addr(), DEFAULT_BASE.get() + 2888 + 92);
        assert!(mq.init(&mut s, 5));
        assert!(mq.try_jam(&mut s, 0x1122_3344));

        let mem = s.memory();
        assert_eq!(mem.load_u32(mq.addr() + MESSAGE_QUEUE_COUNT), 5);
        assert_eq!(mem.load_u32(mq.addr() + MESSAGE_QUEUE_FIRST), 4);
        assert_eq!(mem.load_u32(mq.addr() + MESSAGE_QUEUE_USED), 1);
        assert_eq!(mem.load_u32(mq.addr() + MESSAGE_QUEUE_MESSAGES + 16), 0x1122_3344);
    }
}
