//! Persistent task scheduler: store, recurrence engine, and poller.
//!
//! Tasks are created by the `schedule_task` tool with a caller-computed
//! first trigger, persisted by [`store::TaskStore`], picked up when due
//! by [`run::SchedulerLoop`], executed through the same tool pipeline as
//! live conversation, and advanced by [`engine::next_run`].

pub mod engine;
pub mod run;
pub mod store;
