//! Fixed layout of the scheduler region.
//!
//! All offsets are in bytes. Queue headers and thread records are plain
//! sequences of 16/32-bit fields so the region can be diffed against a dump
//! taken on hardware.
//!
//! ```text
//! base + 0      run queues     32 * 8   = 256
//! base + 256    active queue    1 * 8   =   8
//! base + 264    threads        32 * 64  = 2048
//! base + 2312   wait queues    16 * 8   = 128
//! base + 2440   mutexes        16 * 24  = 384   (reserved, zero)
//! base + 2824   conds           8 * 8   =  64
//! base + 2888   message queues  8 * 92  = 736
//!                                total    3624
//! ```

/// Number of priority levels (and run queues).
pub const PRIORITY_LEVELS: usize = 32;
/// Highest priority.
pub const PRIORITY_MIN: i32 = 0;
/// Lowest valid priority.
pub const PRIORITY_MAX: i32 = 31;
/// Priority given to a waiting thread while it is suspended, worse than any valid one.
pub const PRIORITY_SUSPENDED_WAITER: i32 = PRIORITY_MAX + 1;
/// Base priority of the thread installed by [`crate::Scheduler::init`].
pub const DEFAULT_THREAD_PRIORITY: i32 = 16;

/// Number of thread records.
pub const MAX_THREADS: usize = 32;
/// Number of generic wait queues.
pub const MAX_WAIT_QUEUES: usize = 16;
/// Number of mutex records. Their area is reserved and kept zero.
pub const MAX_MUTEXES: usize = 16;
/// Number of condition variables.
pub const MAX_CONDS: usize = 8;
/// Number of message queues.
pub const MAX_MESSAGE_QUEUES: usize = 8;
/// Capacity limit of a single message queue.
pub const MAX_MESSAGES_PER_QUEUE: usize = 16;

/// Exit value of a thread that has not exited.
pub const EXIT_VALUE_NONE: u32 = 0xFFFF_FFFF;

/// Queue header: first thread.
pub const QUEUE_HEAD: u32 = 0;
/// Queue header: last thread.
pub const QUEUE_TAIL: u32 = 4;
/// Size of a queue header.
pub const QUEUE_SIZE: u32 = 8;

/// Thread record: pool slot index (u32).
pub const THREAD_ID: u32 = 0;
/// Thread record: [`crate::ThreadState`] (u16).
pub const THREAD_STATE: u32 = 4;
/// Thread record: [`crate::ThreadAttributes`] (u16).
pub const THREAD_ATTR: u32 = 6;
/// Thread record: suspend count (s32).
pub const THREAD_SUSPEND: u32 = 8;
/// Thread record: effective priority (s32).
pub const THREAD_PRIORITY: u32 = 12;
/// Thread record: base priority (s32).
pub const THREAD_BASE: u32 = 16;
/// Thread record: exit value (u32).
pub const THREAD_VAL: u32 = 20;
/// Thread record: queue the thread is linked into.
pub const THREAD_QUEUE: u32 = 24;
/// Thread record: next thread on the scheduling link.
pub const THREAD_LINK_NEXT: u32 = 28;
/// Thread record: previous thread on the scheduling link.
pub const THREAD_LINK_PREV: u32 = 32;
/// Thread record: header of the join queue.
pub const THREAD_JOIN_QUEUE: u32 = 36;
// 44..56: reserved for mutex bookkeeping, kept zero.
/// Thread record: next thread on the active link.
pub const THREAD_ACTIVE_NEXT: u32 = 56;
/// Thread record: previous thread on the active link.
pub const THREAD_ACTIVE_PREV: u32 = 60;
/// Size of a thread record.
pub const THREAD_SIZE: u32 = 64;

/// Size of a mutex record. The mutex area is reserved and kept zero.
pub const MUTEX_SIZE: u32 = 24;

/// Condition variable: wait queue header.
pub const COND_QUEUE: u32 = 0;
/// Size of a condition variable record.
pub const COND_SIZE: u32 = QUEUE_SIZE;

/// Message queue: threads waiting for free space.
pub const MESSAGE_QUEUE_SEND: u32 = 0;
/// Message queue: threads waiting for messages.
pub const MESSAGE_QUEUE_RECEIVE: u32 = 8;
/// Message queue: capacity (s32).
pub const MESSAGE_QUEUE_COUNT: u32 = 16;
/// Message queue: slot of the oldest message (s32).
pub const MESSAGE_QUEUE_FIRST: u32 = 20;
/// Message queue: number of queued messages (s32).
pub const MESSAGE_QUEUE_USED: u32 = 24;
/// Message queue: first of the `u32` message slots.
pub const MESSAGE_QUEUE_MESSAGES: u32 = 28;
/// Size of a message queue record.
pub const MESSAGE_QUEUE_SIZE: u32 = MESSAGE_QUEUE_MESSAGES + MAX_MESSAGES_PER_QUEUE as u32 * 4;

/// Run queues, one per priority.
pub const RUNQUEUE_OFFSET: u32 = 0;
/// Queue of all non-inactive threads.
pub const ACTIVE_QUEUE_OFFSET: u32 = RUNQUEUE_OFFSET + PRIORITY_LEVELS as u32 * QUEUE_SIZE;
/// Thread record pool.
pub const THREADS_OFFSET: u32 = ACTIVE_QUEUE_OFFSET + QUEUE_SIZE;
/// Wait queue pool.
pub const WAIT_QUEUES_OFFSET: u32 = THREADS_OFFSET + MAX_THREADS as u32 * THREAD_SIZE;
/// Mutex pool (reserved).
pub const MUTEXES_OFFSET: u32 = WAIT_QUEUES_OFFSET + MAX_WAIT_QUEUES as u32 * QUEUE_SIZE;
/// Condition variable pool.
pub const CONDS_OFFSET: u32 = MUTEXES_OFFSET + MAX_MUTEXES as u32 * MUTEX_SIZE;
/// Message queue pool.
pub const MESSAGE_QUEUES_OFFSET: u32 = CONDS_OFFSET + MAX_CONDS as u32 * COND_SIZE;
/// Total size of the region in bytes.
pub const REGION_SIZE: usize =
    (MESSAGE_QUEUES_OFFSET + MAX_MESSAGE_QUEUES as u32 * MESSAGE_QUEUE_SIZE) as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_console_layout() {
        assert_eq!(ACTIVE_QUEUE_OFFSET, 256);
        assert_eq!(THREADS_OFFSET, 264);
        assert_eq!(WAIT_QUEUES_OFFSET, 2312);
        assert_eq!(MUTEXES_OFFSET, 2440);
        assert_eq!(CONDS_OFFSET, 2824);
        assert_eq!(MESSAGE_QUEUES_OFFSET, 2888);
        assert_eq!(MESSAGE_QUEUE_SIZE, 92);
        assert_eq!(REGION_SIZE, 3624);
        assert_eq!(THREAD_ACTIVE_PREV + 4, THREAD_SIZE);
    }
}
