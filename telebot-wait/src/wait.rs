//! The driver loop: pull events from an [`UpdateSource`], test them against top-level conditions,
//! forward them to a [`Forks`] registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use telebot_core::{UpdateSource, WaitResult};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::condition::Condition;
use crate::fork::deadline_after;
use crate::forks::Forks;

/// Pause between driver iterations.
pub const DRIVER_TICK: Duration = Duration::from_millis(100);

/// Poll interval requested from the source's producer while a driver runs.
pub const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runs top-level conditions against one event, in order. Every matching condition runs its
/// callback; the first one with a stop value ends the scan and yields that value.
fn evaluate<E, R: Clone>(conditions: &[Condition<E, R>], event: &E) -> WaitResult<Option<R>> {
    for condition in conditions {
        if condition.meet(event)? {
            condition.invoke_callback(event);
            if let Some(value) = condition.stop_value(event) {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

/// Waits until a top-level condition with a stop value matches an event and returns that value.
///
/// Each iteration takes the events pending at its start, oldest first. Events that produced no
/// stop value are forwarded to `forks`. Events after the stopping one stay in the source.
/// Returns `Ok(None)` once `timeout` has elapsed; with no timeout the wait only ends on a match.
#[instrument(skip_all, fields(conditions = conditions.len(), timeout = ?timeout))]
pub async fn wait_for<S, R>(
    source: &S,
    conditions: &[Condition<S::Event, R>],
    timeout: Option<Duration>,
    forks: Option<&Forks<S::Event, R>>,
) -> WaitResult<Option<R>>
where
    S: UpdateSource + ?Sized,
    R: Clone,
{
    source.set_poll_interval(SOURCE_POLL_INTERVAL);
    let deadline = timeout.map(deadline_after).transpose()?;

    loop {
        let pending = source.pending_count();
        for _ in 0..pending {
            let Some(event) = source.next_pending() else {
                break;
            };
            if let Some(value) = evaluate(conditions, &event)? {
                debug!("condition met, wait finished");
                return Ok(Some(value));
            }
            if let Some(forks) = forks {
                forks.send(&event)?;
            }
        }

        if let Some(deadline) = deadline {
            if Utc::now() > deadline {
                info!("wait timed out");
                return Ok(None);
            }
        }
        tokio::time::sleep(DRIVER_TICK).await;
    }
}

/// Runs [`wait_for`] as a background task and returns its handle immediately.
///
/// Dropping the handle does not stop the task; it runs until it finishes or the runtime shuts down.
pub fn wait_for_spawned<S, R>(
    source: Arc<S>,
    conditions: Vec<Condition<S::Event, R>>,
    timeout: Option<Duration>,
    forks: Option<Arc<Forks<S::Event, R>>>,
) -> JoinHandle<WaitResult<Option<R>>>
where
    S: UpdateSource + ?Sized + 'static,
    S::Event: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        wait_for(source.as_ref(), &conditions, timeout, forks.as_deref()).await
    })
}
