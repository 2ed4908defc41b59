//! Synchronization primitives built on [`Scheduler::sleep`](crate::Scheduler::sleep)
//! and [`Scheduler::wakeup`](crate::Scheduler::wakeup).
mod cond;
mod event;
mod message_queue;

pub use cond::Cond;
pub use event::Event;
pub use message_queue::MessageQueue;
