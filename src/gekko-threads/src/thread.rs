use core::num::NonZeroU32;

use gekko_mem::{Address, Memory};

use crate::layout::{QUEUE_HEAD, QUEUE_TAIL, THREAD_JOIN_QUEUE};

/// Address of a thread record inside the scheduler region.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadHandle(NonZeroU32);

/// Address of a queue header (run queue, wait queue, active queue or a join queue).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueHandle(NonZeroU32);

impl ThreadHandle {
    /// Interprets a raw link value; `0` is the null link.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Returns the address of the record.
    pub const fn addr(self) -> Address {
        self.0.get()
    }

    pub(crate) const fn at(addr: NonZeroU32) -> Self {
        Self(addr)
    }

    pub(crate) const fn field(self, offset: u32) -> Address {
        self.0.get().wrapping_add(offset)
    }

    /// The queue header embedded in the record, holding joiners.
    pub(crate) const fn join_queue(self) -> QueueHandle {
        QueueHandle(self.0.saturating_add(THREAD_JOIN_QUEUE))
    }
}

impl QueueHandle {
    /// Interprets a raw queue reference; `0` means "no queue".
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Returns the address of the header.
    pub const fn addr(self) -> Address {
        self.0.get()
    }

    pub(crate) const fn at(addr: NonZeroU32) -> Self {
        Self(addr)
    }

    /// Returns the first thread in the queue.
    pub fn head<M: Memory + ?Sized>(self, mem: &M) -> Option<ThreadHandle> {
        ThreadHandle::from_raw(mem.load_u32(self.addr().wrapping_add(QUEUE_HEAD)))
    }

    /// Returns the last thread in the queue.
    pub fn tail<M: Memory + ?Sized>(self, mem: &M) -> Option<ThreadHandle> {
        ThreadHandle::from_raw(mem.load_u32(self.addr().wrapping_add(QUEUE_TAIL)))
    }

    /// Returns `true` if no thread is linked into this queue.
    pub fn is_empty<M: Memory + ?Sized>(self, mem: &M) -> bool {
        self.head(mem).is_none()
    }

    pub(crate) fn set_head<M: Memory + ?Sized>(self, mem: &mut M, thread: Option<ThreadHandle>) {
        mem.store_u32(self.addr().wrapping_add(QUEUE_HEAD), raw(thread));
    }

    pub(crate) fn set_tail<M: Memory + ?Sized>(self, mem: &mut M, thread: Option<ThreadHandle>) {
        mem.store_u32(self.addr().wrapping_add(QUEUE_TAIL), raw(thread));
    }

    pub(crate) fn clear<M: Memory + ?Sized>(self, mem: &mut M) {
        self.set_head(mem, None);
        self.set_tail(mem, None);
    }
}

pub(crate) fn raw(thread: Option<ThreadHandle>) -> u32 {
    thread.map_or(0, ThreadHandle::addr)
}

/// Possible states of a thread record.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ThreadState {
    /// Unused slot, or a detached thread that finished.
    Inactive = 0,
    /// Runnable once its suspend count is zero; sits in a run queue if so.
    Ready = 1,
    /// The current thread.
    Running = 2,
    /// Sleeping on a wait queue.
    Waiting = 4,
    /// Finished joinable thread, waiting to be joined.
    Moribund = 8,
}

impl ThreadState {
    /// Decodes the state field. Unknown values read as [`ThreadState::Inactive`].
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            1 => ThreadState::Ready,
            2 => ThreadState::Running,
            4 => ThreadState::Waiting,
            8 => ThreadState::Moribund,
            _ => ThreadState::Inactive,
        }
    }

    /// Encodes the state field.
    pub const fn to_raw(self) -> u16 {
        self as u16
    }
}

bitflags::bitflags! {
    /// Thread attribute bits.
    #[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
    pub struct ThreadAttributes: u16 {
        /// The record is recycled as soon as the thread exits or is cancelled.
        const DETACHED = 0x0001;
    }
}

/// Snapshot of a thread record.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ThreadInfo {
    /// Pool slot index.
    pub id: u32,
    /// Lifecycle state.
    pub state: ThreadState,
    /// Attribute bits.
    pub attributes: ThreadAttributes,
    /// Suspend count; the thread is runnable only at zero.
    pub suspend_count: i32,
    /// Effective priority.
    pub priority: i32,
    /// Priority set at creation.
    pub base_priority: i32,
    /// Value passed to exit, or [`crate::layout::EXIT_VALUE_NONE`].
    pub exit_value: u32,
    /// Queue the thread is linked into through its scheduling link.
    pub queue: Option<QueueHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_encoding() {
        for state in [
            ThreadState::Inactive,
            ThreadState::Ready,
            ThreadState::Running,
            ThreadState::Waiting,
            ThreadState::Moribund,
        ] {
            assert_eq!(ThreadState::from_raw(state.to_raw()), state);
        }
        assert_eq!(ThreadState::from_raw(3), ThreadState::Inactive);
    }

    #[test]
    fn null_handles() {
        assert!(ThreadHandle::from_raw(0).is_none());
        assert!(QueueHandle::from_raw(0).is_none());
        assert_eq!(ThreadHandle::from_raw(0x10).map(ThreadHandle::addr), Some(0x10));
        assert_eq!(raw(None), 0);
    }
}
