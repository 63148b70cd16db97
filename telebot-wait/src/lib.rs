//! # telebot-wait
//!
//! Blocks callers until inbound updates match declared patterns.
//!
//! - [`Filter`]: one predicate; events missing the inspected field count as "no match".
//! - [`Condition`]: conjunction of filters (optionally negated) with a callback and an optional stop value.
//! - [`Fork`]: branch conditions plus one completion condition, evaluated per event until completion or timeout.
//! - [`Forks`]: registry of active forks; every dispatched event fans out to all of them.
//! - [`wait_for`] / [`wait_for_spawned`]: the driver pulling from an [`UpdateSource`](telebot_core::UpdateSource).

mod condition;
mod filter;
mod fork;
mod forks;
mod wait;

pub use condition::{Condition, StopValue};
pub use filter::Filter;
pub use fork::{Fork, JOIN_POLL_INTERVAL};
pub use forks::Forks;
pub use wait::{wait_for, wait_for_spawned, DRIVER_TICK, SOURCE_POLL_INTERVAL};

pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
