//! Ready bitmap and run-queue membership.
//!
//! Bit `31 - p` of the ready bitmap is set iff run queue `p` is non-empty, so
//! counting leading zeros yields the best ready priority in one step.

use gekko_mem::Memory;

use crate::{
    layout::{PRIORITY_LEVELS, PRIORITY_MAX, PRIORITY_MIN},
    queue::{self, SchedulingLink},
    MutexHooks, Scheduler, ThreadHandle,
};

cfg_if::cfg_if! {
    if #[cfg(feature = "portable-clz")] {
        /// Counts leading zero bits; `32` for zero.
        pub fn count_leading_zeros(x: u32) -> u32 {
            portable_count_leading_zeros(x)
        }
    } else {
        /// Counts leading zero bits; `32` for zero.
        pub fn count_leading_zeros(x: u32) -> u32 {
            x.leading_zeros()
        }
    }
}

/// Bit-halving count-leading-zeros for targets without the intrinsic.
pub fn portable_count_leading_zeros(mut x: u32) -> u32 {
    if x == 0 {
        return 32;
    }
    let mut n = 0;
    if x & 0xFFFF_0000 == 0 {
        n += 16;
        x <<= 16;
    }
    if x & 0xFF00_0000 == 0 {
        n += 8;
        x <<= 8;
    }
    if x & 0xF000_0000 == 0 {
        n += 4;
        x <<= 4;
    }
    if x & 0xC000_0000 == 0 {
        n += 2;
        x <<= 2;
    }
    if x & 0x8000_0000 == 0 {
        n += 1;
    }
    n
}

/// Best (lowest-numbered) priority with ready work, or [`PRIORITY_LEVELS`]
/// when nothing is ready.
pub fn highest_ready_priority(ready_bits: u32) -> i32 {
    count_leading_zeros(ready_bits) as i32
}

/// Bitmap bit for priority level `priority`.
pub(crate) fn ready_bit(priority: i32) -> u32 {
    1 << (PRIORITY_MAX - run_level(priority))
}

/// Clamps a priority onto a run-queue level.
///
/// Threads only enter run queues with a valid effective priority; the clamp
/// keeps a corrupted record from indexing past the run-queue table.
pub(crate) fn run_level(priority: i32) -> i32 {
    debug_assert!(
        (PRIORITY_MIN..=PRIORITY_MAX).contains(&priority),
        "priority out of run-queue range"
    );
    priority.clamp(PRIORITY_MIN, PRIORITY_MAX)
}

const _: () = assert!(PRIORITY_LEVELS == u32::BITS as usize);

impl<M: Memory, H: MutexHooks> Scheduler<M, H> {
    /// Appends `thread` to the run queue of its effective priority.
    pub(crate) fn set_run(&mut self, thread: ThreadHandle) {
        let priority = self.priority(thread);
        let queue = self.run_queue_at(priority);
        self.set_queue(thread, Some(queue));
        queue::add_tail::<SchedulingLink, M>(&mut self.mem, queue, thread);
        self.ready_bits |= ready_bit(priority);
        self.reschedule_hint = true;
    }

    /// Removes `thread` from the run queue it sits in.
    pub(crate) fn unset_run(&mut self, thread: ThreadHandle) {
        let priority = self.priority(thread);
        if let Some(queue) = self.queue_of(thread) {
            queue::remove_item::<SchedulingLink, M>(&mut self.mem, queue, thread);
            if queue.is_empty(&self.mem) {
                self.ready_bits &= !ready_bit(priority);
            }
        }
        self.set_queue(thread, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clz_matches_intrinsic() {
        let mut x: u32 = 1;
        for _ in 0..1000 {
            assert_eq!(portable_count_leading_zeros(x), x.leading_zeros());
            assert_eq!(count_leading_zeros(x), x.leading_zeros());
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
        }
        for shift in 0..32 {
            assert_eq!(portable_count_leading_zeros(1 << shift), 31 - shift);
        }
    }

    #[test]
    fn empty_bitmap_is_sentinel() {
        assert_eq!(count_leading_zeros(0), 32);
        assert_eq!(portable_count_leading_zeros(0), 32);
        assert_eq!(highest_ready_priority(0), PRIORITY_LEVELS as i32);
    }

    #[test]
    fn bits_map_to_priorities() {
        assert_eq!(ready_bit(0), 0x8000_0000);
        assert_eq!(ready_bit(31), 1);
        assert_eq!(highest_ready_priority(ready_bit(16) | ready_bit(20)), 16);
        assert_eq!(highest_ready_priority(ready_bit(31)), 31);
    }
}
