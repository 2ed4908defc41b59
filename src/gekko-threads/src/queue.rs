//! Doubly linked thread queues living in the scheduler region.
//!
//! A thread record carries two independent link pairs: the scheduling link,
//! used by run queues, wait queues and join queues, and the active link, used
//! by the registry of live threads. The queue operations are generic over a
//! [`Link`] selecting which pair to follow.
//!
//! operation           | runtime | description
//! --------------------|---------|------------------------------------------
//! [`add_tail`]        | O(1)    | append
//! [`add_priority`]    | O(n)    | insert after all entries of equal or better priority
//! [`remove_item`]     | O(1)    | unlink a given thread
//! [`remove_head`]     | O(1)    | pop the first thread
//!
//! Removed threads get both links of the selected pair cleared.

use core::marker::PhantomData;

use gekko_mem::Memory;

use crate::{
    layout::{
        THREAD_ACTIVE_NEXT, THREAD_ACTIVE_PREV, THREAD_LINK_NEXT, THREAD_LINK_PREV,
        THREAD_PRIORITY,
    },
    thread::raw,
    QueueHandle, ThreadHandle,
};

/// Selects a next/prev field pair inside a thread record.
pub trait Link {
    /// Offset of the "next" field.
    const NEXT: u32;
    /// Offset of the "prev" field.
    const PREV: u32;
}

/// The link used by run queues, wait queues and join queues.
pub enum SchedulingLink {}

/// The link used by the active-thread registry.
pub enum ActiveLink {}

impl Link for SchedulingLink {
    const NEXT: u32 = THREAD_LINK_NEXT;
    const PREV: u32 = THREAD_LINK_PREV;
}

impl Link for ActiveLink {
    const NEXT: u32 = THREAD_ACTIVE_NEXT;
    const PREV: u32 = THREAD_ACTIVE_PREV;
}

/// Returns the thread after `thread` along link `L`.
pub fn next<L: Link, M: Memory + ?Sized>(mem: &M, thread: ThreadHandle) -> Option<ThreadHandle> {
    ThreadHandle::from_raw(mem.load_u32(thread.field(L::NEXT)))
}

/// Returns the thread before `thread` along link `L`.
pub fn prev<L: Link, M: Memory + ?Sized>(mem: &M, thread: ThreadHandle) -> Option<ThreadHandle> {
    ThreadHandle::from_raw(mem.load_u32(thread.field(L::PREV)))
}

fn set_next<L: Link, M: Memory + ?Sized>(
    mem: &mut M,
    thread: ThreadHandle,
    next: Option<ThreadHandle>,
) {
    mem.store_u32(thread.field(L::NEXT), raw(next));
}

fn set_prev<L: Link, M: Memory + ?Sized>(
    mem: &mut M,
    thread: ThreadHandle,
    prev: Option<ThreadHandle>,
) {
    mem.store_u32(thread.field(L::PREV), raw(prev));
}

/// Appends `thread` to `queue`.
pub fn add_tail<L: Link, M: Memory + ?Sized>(mem: &mut M, queue: QueueHandle, thread: ThreadHandle) {
    let prev = queue.tail(mem);
    match prev {
        None => queue.set_head(mem, Some(thread)),
        Some(prev) => set_next::<L, M>(mem, prev, Some(thread)),
    }
    set_prev::<L, M>(mem, thread, prev);
    set_next::<L, M>(mem, thread, None);
    queue.set_tail(mem, Some(thread));
}

/// Inserts `thread` in front of the first entry with a strictly worse
/// (numerically greater) priority.
///
/// Entries of equal priority keep their insertion order.
pub fn add_priority<L: Link, M: Memory + ?Sized>(
    mem: &mut M,
    queue: QueueHandle,
    thread: ThreadHandle,
) {
    let priority = mem.load_i32(thread.field(THREAD_PRIORITY));

    let mut cursor = queue.head(mem);
    while let Some(entry) = cursor {
        if mem.load_i32(entry.field(THREAD_PRIORITY)) > priority {
            break;
        }
        cursor = next::<L, M>(mem, entry);
    }

    let Some(next) = cursor else {
        add_tail::<L, M>(mem, queue, thread);
        return;
    };

    set_next::<L, M>(mem, thread, Some(next));
    let prev = prev::<L, M>(mem, next);
    set_prev::<L, M>(mem, next, Some(thread));
    set_prev::<L, M>(mem, thread, prev);
    match prev {
        None => queue.set_head(mem, Some(thread)),
        Some(prev) => set_next::<L, M>(mem, prev, Some(thread)),
    }
}

/// Unlinks `thread` from `queue`.
///
/// `thread` must be linked into `queue` along `L`.
pub fn remove_item<L: Link, M: Memory + ?Sized>(
    mem: &mut M,
    queue: QueueHandle,
    thread: ThreadHandle,
) {
    let next = next::<L, M>(mem, thread);
    let prev = prev::<L, M>(mem, thread);
    match next {
        None => queue.set_tail(mem, prev),
        Some(next) => set_prev::<L, M>(mem, next, prev),
    }
    match prev {
        None => queue.set_head(mem, next),
        Some(prev) => set_next::<L, M>(mem, prev, next),
    }
    set_next::<L, M>(mem, thread, None);
    set_prev::<L, M>(mem, thread, None);
}

/// Pops the first thread of `queue`, if any.
pub fn remove_head<L: Link, M: Memory + ?Sized>(
    mem: &mut M,
    queue: QueueHandle,
) -> Option<ThreadHandle> {
    let thread = queue.head(mem)?;
    let new_head = next::<L, M>(mem, thread);
    match new_head {
        None => queue.set_tail(mem, None),
        Some(new_head) => set_prev::<L, M>(mem, new_head, None),
    }
    queue.set_head(mem, new_head);
    set_next::<L, M>(mem, thread, None);
    Some(thread)
}

/// Iterator over the threads of a queue, head to tail.
pub struct Iter<'a, L: Link, M: Memory + ?Sized> {
    mem: &'a M,
    cursor: Option<ThreadHandle>,
    _link: PhantomData<L>,
}

/// Walks `queue` along link `L`.
pub fn iter<L: Link, M: Memory + ?Sized>(mem: &M, queue: QueueHandle) -> Iter<'_, L, M> {
    Iter {
        mem,
        cursor: queue.head(mem),
        _link: PhantomData,
    }
}

impl<L: Link, M: Memory + ?Sized> Iterator for Iter<'_, L, M> {
    type Item = ThreadHandle;

    fn next(&mut self) -> Option<ThreadHandle> {
        let thread = self.cursor?;
        self.cursor = next::<L, M>(self.mem, thread);
        Some(thread)
    }
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroU32;

    use gekko_mem::Arena;

    use super::*;

    const BASE: u32 = 0x1000;

    // One queue header at BASE, a second at BASE + 8, four 64-byte records from BASE + 16.
    type Mem = Arena<{ 16 + 4 * 64 }>;

    fn queue(n: u32) -> QueueHandle {
        QueueHandle::from_raw(BASE + n * 8).unwrap()
    }

    fn thread(mem: &mut Mem, n: u32, priority: i32) -> ThreadHandle {
        let t = ThreadHandle::at(NonZeroU32::new(BASE + 16 + n * 64).unwrap());
        mem.store_i32(t.field(THREAD_PRIORITY), priority);
        t
    }

    fn collect<L: Link>(mem: &Mem, q: QueueHandle) -> Vec<ThreadHandle> {
        iter::<L, _>(mem, q).collect()
    }

    fn collect_backwards<L: Link>(mem: &Mem, q: QueueHandle) -> Vec<ThreadHandle> {
        let mut out = Vec::new();
        let mut cursor = q.tail(mem);
        while let Some(t) = cursor {
            out.push(t);
            cursor = prev::<L, _>(mem, t);
        }
        out.reverse();
        out
    }

    #[test]
    fn tail_and_head() {
        let mut mem = Mem::big_endian(BASE);
        let q = queue(0);
        let a = thread(&mut mem, 0, 0);
        let b = thread(&mut mem, 1, 0);

        assert!(q.is_empty(&mem));
        assert_eq!(remove_head::<SchedulingLink, _>(&mut mem, q), None);

        add_tail::<SchedulingLink, _>(&mut mem, q, a);
        add_tail::<SchedulingLink, _>(&mut mem, q, b);
        assert_eq!(collect::<SchedulingLink>(&mem, q), vec![a, b]);
        assert_eq!(collect_backwards::<SchedulingLink>(&mem, q), vec![a, b]);

        assert_eq!(remove_head::<SchedulingLink, _>(&mut mem, q), Some(a));
        assert_eq!(q.head(&mem), Some(b));
        assert_eq!(prev::<SchedulingLink, _>(&mem, b), None);
        assert_eq!(next::<SchedulingLink, _>(&mem, a), None);

        assert_eq!(remove_head::<SchedulingLink, _>(&mut mem, q), Some(b));
        assert_eq!(q.head(&mem), None);
        assert_eq!(q.tail(&mem), None);
    }

    #[test]
    fn priority_order_fifo_among_equals() {
        let mut mem = Mem::big_endian(BASE);
        let q = queue(0);
        let a = thread(&mut mem, 0, 5);
        let b = thread(&mut mem, 1, 3);
        let c = thread(&mut mem, 2, 5);
        let d = thread(&mut mem, 3, 1);

        for t in [a, b, c, d] {
            add_priority::<SchedulingLink, _>(&mut mem, q, t);
        }

        assert_eq!(collect::<SchedulingLink>(&mem, q), vec![d, b, a, c]);
        assert_eq!(collect_backwards::<SchedulingLink>(&mem, q), vec![d, b, a, c]);

        let mut popped = Vec::new();
        while let Some(t) = remove_head::<SchedulingLink, _>(&mut mem, q) {
            popped.push(t);
        }
        assert_eq!(popped, vec![d, b, a, c]);
    }

    #[test]
    fn remove_from_middle_and_ends() {
        let mut mem = Mem::big_endian(BASE);
        let q = queue(0);
        let ts: Vec<_> = (0..4).map(|n| thread(&mut mem, n, 0)).collect();
        for t in &ts {
            add_tail::<SchedulingLink, _>(&mut mem, q, *t);
        }

        remove_item::<SchedulingLink, _>(&mut mem, q, ts[1]);
        assert_eq!(collect::<SchedulingLink>(&mem, q), vec![ts[0], ts[2], ts[3]]);
        assert_eq!(next::<SchedulingLink, _>(&mem, ts[1]), None);
        assert_eq!(prev::<SchedulingLink, _>(&mem, ts[1]), None);

        remove_item::<SchedulingLink, _>(&mut mem, q, ts[3]);
        assert_eq!(q.tail(&mem), Some(ts[2]));
        remove_item::<SchedulingLink, _>(&mut mem, q, ts[0]);
        assert_eq!(q.head(&mem), Some(ts[2]));
        remove_item::<SchedulingLink, _>(&mut mem, q, ts[2]);
        assert!(q.is_empty(&mem));
        assert_eq!(q.tail(&mem), None);
    }

    #[test]
    fn links_are_independent() {
        let mut mem = Mem::big_endian(BASE);
        let sched = queue(0);
        let active = queue(1);
        let a = thread(&mut mem, 0, 0);
        let b = thread(&mut mem, 1, 0);

        add_tail::<SchedulingLink, _>(&mut mem, sched, b);
        add_tail::<SchedulingLink, _>(&mut mem, sched, a);
        add_tail::<ActiveLink, _>(&mut mem, active, a);
        add_tail::<ActiveLink, _>(&mut mem, active, b);

        assert_eq!(collect::<SchedulingLink>(&mem, sched), vec![b, a]);
        assert_eq!(collect::<ActiveLink>(&mem, active), vec![a, b]);

        remove_item::<ActiveLink, _>(&mut mem, active, a);
        assert_eq!(collect::<ActiveLink>(&mem, active), vec![b]);
        assert_eq!(collect::<SchedulingLink>(&mem, sched), vec![b, a]);
    }
}
