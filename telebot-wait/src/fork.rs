//! A fork waits for one completion condition while reacting to branch conditions.
//!
//! States: running, then done exactly once when the completion condition matches. A timeout does
//! not mark the fork done; it surfaces as [`WaitError::Expired`] from [`Fork::join`] and as
//! `expired() == true` for the registry sweep.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use telebot_core::{WaitError, WaitResult};
use tracing::{debug, warn};

use crate::condition::Condition;
use crate::lock;

/// How often [`Fork::join`] re-checks the fork.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct ForkState<E, R> {
    /// Set once, by the completion condition; `Some` means done.
    result: Option<R>,
    substitute: Option<Arc<Fork<E, R>>>,
}

enum JoinStep<E, R> {
    Done(R),
    Redirect(Arc<Fork<E, R>>),
    Expired(DateTime<Utc>),
    Pending,
}

pub struct Fork<E, R> {
    branches: Vec<Condition<E, R>>,
    completion: Condition<E, R>,
    exclusive: bool,
    deadline: Option<DateTime<Utc>>,
    /// Serializes `process` so callbacks run once per event without holding `state`.
    gate: Mutex<()>,
    state: Mutex<ForkState<E, R>>,
}

/// Absolute wall-clock deadline `timeout` from now.
pub(crate) fn deadline_after(timeout: Duration) -> WaitResult<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(timeout)
        .map_err(|e| WaitError::InvalidTimeout(format!("{:?}: {}", timeout, e)))?;
    Utc::now()
        .checked_add_signed(delta)
        .ok_or_else(|| WaitError::InvalidTimeout(format!("{:?} overflows the clock", timeout)))
}

impl<E, R: Clone> Fork<E, R> {
    /// Builds a running fork.
    ///
    /// Branches must not carry a stop value and the completion condition must carry one.
    pub fn new(
        branches: Vec<Condition<E, R>>,
        completion: Condition<E, R>,
        exclusive: bool,
        timeout: Option<Duration>,
    ) -> WaitResult<Self> {
        if let Some(index) = branches.iter().position(Condition::has_stop_value) {
            return Err(WaitError::BranchHasStopValue { index });
        }
        if !completion.has_stop_value() {
            return Err(WaitError::CompletionWithoutStopValue);
        }
        let deadline = timeout.map(deadline_after).transpose()?;

        Ok(Self {
            branches,
            completion,
            exclusive,
            deadline,
            gate: Mutex::new(()),
            state: Mutex::new(ForkState {
                result: None,
                substitute: None,
            }),
        })
    }

    /// Evaluates one event. No-op once done.
    ///
    /// The completion condition is checked first; when it matches, branches are skipped. Otherwise
    /// matching branches run their callbacks in order (only the first one when exclusive), then the
    /// completion condition is checked again.
    pub fn process(&self, event: &E) -> WaitResult<()> {
        let _gate = lock(&self.gate);
        if self.is_done() {
            return Ok(());
        }

        if self.completion.meet(event)? {
            self.complete(event);
            return Ok(());
        }

        let mut matched = false;
        for (index, branch) in self.branches.iter().enumerate() {
            if branch.meet(event)? {
                matched = true;
                debug!(branch = index, name = ?branch.name(), "fork branch matched");
                branch.invoke_callback(event);
                if self.exclusive {
                    break;
                }
            }
        }

        if self.completion.meet(event)? {
            self.complete(event);
        } else if matched {
            warn!("fork matched but is not complete");
        }
        Ok(())
    }

    fn complete(&self, event: &E) {
        self.completion.invoke_callback(event);
        let result = self.completion.stop_value(event);
        lock(&self.state).result = result;
        debug!(name = ?self.completion.name(), "fork completed");
    }

    pub fn is_done(&self) -> bool {
        lock(&self.state).result.is_some()
    }

    /// True once the deadline has passed, whether or not the fork is done.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Utc::now() > deadline)
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// The completion stop value, `None` until done.
    pub fn get_result(&self) -> Option<R> {
        lock(&self.state).result.clone()
    }

    /// Hands future joins over to `substitute`.
    pub(crate) fn set_substitute(&self, substitute: Arc<Fork<E, R>>) {
        lock(&self.state).substitute = Some(substitute);
    }

    fn substitute(&self) -> Option<Arc<Fork<E, R>>> {
        lock(&self.state).substitute.clone()
    }

    /// True if `other` is this fork or sits on its chain of substitutes.
    pub(crate) fn leads_to(self: &Arc<Self>, other: &Arc<Fork<E, R>>) -> bool {
        let mut cursor = Some(Arc::clone(self));
        while let Some(fork) = cursor {
            if Arc::ptr_eq(&fork, other) {
                return true;
            }
            cursor = fork.substitute();
        }
        false
    }

    fn poll_join(&self) -> JoinStep<E, R> {
        let state = lock(&self.state);
        if let Some(result) = &state.result {
            return JoinStep::Done(result.clone());
        }
        if let Some(substitute) = &state.substitute {
            return JoinStep::Redirect(Arc::clone(substitute));
        }
        match self.deadline {
            Some(deadline) if Utc::now() > deadline => JoinStep::Expired(deadline),
            _ => JoinStep::Pending,
        }
    }

    /// Waits until done and returns the result, following substitutes installed by
    /// [`Forks::replace`](crate::Forks::replace).
    ///
    /// Fails with [`WaitError::Expired`] when the deadline of the fork being waited on passes
    /// first. Without a deadline this only returns once the fork completes.
    pub async fn join(&self) -> WaitResult<R> {
        let mut redirected: Option<Arc<Fork<E, R>>> = None;
        loop {
            let step = match &redirected {
                Some(fork) => fork.poll_join(),
                None => self.poll_join(),
            };
            match step {
                JoinStep::Done(result) => return Ok(result),
                JoinStep::Redirect(next) => {
                    debug!("fork replaced, joining substitute");
                    redirected = Some(next);
                }
                JoinStep::Expired(deadline) => return Err(WaitError::Expired { deadline }),
                JoinStep::Pending => tokio::time::sleep(JOIN_POLL_INTERVAL).await,
            }
        }
    }
}

impl<E, R> fmt::Debug for Fork<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fork")
            .field("branches", &self.branches)
            .field("completion", &self.completion)
            .field("exclusive", &self.exclusive)
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(hits: &Arc<AtomicUsize>, pred: fn(&i32) -> bool) -> Condition<i32, String> {
        let hits = hits.clone();
        Condition::matching(pred).on_match(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn completion_at(target: i32) -> Condition<i32, String> {
        Condition::matching(move |n: &i32| *n == target).stop_with_fn(|n: &i32| format!("done at {}", n))
    }

    #[test]
    fn test_branch_with_stop_value_rejected() {
        let branch = Condition::matching(|_: &i32| true).stop_with("x".to_string());
        let err = Fork::new(vec![Condition::matching(|_| false), branch], completion_at(1), false, None)
            .unwrap_err();
        assert_eq!(err, WaitError::BranchHasStopValue { index: 1 });
    }

    #[test]
    fn test_completion_without_stop_value_rejected() {
        let err = Fork::<i32, String>::new(vec![], Condition::matching(|_| true), false, None)
            .unwrap_err();
        assert_eq!(err, WaitError::CompletionWithoutStopValue);
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let err = Fork::new(vec![], completion_at(1), false, Some(Duration::MAX)).unwrap_err();
        assert!(matches!(err, WaitError::InvalidTimeout(_)));
    }

    #[test]
    fn test_exclusive_runs_first_matching_branch_only() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let fork = Fork::new(
            vec![counting(&first, |_| true), counting(&second, |_| true)],
            completion_at(100),
            true,
            None,
        )
        .unwrap();

        fork.process(&1).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert!(!fork.is_done());
    }

    #[test]
    fn test_non_exclusive_runs_every_matching_branch() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let fork = Fork::new(
            vec![counting(&first, |_| true), counting(&second, |n| *n > 5)],
            completion_at(100),
            false,
            None,
        )
        .unwrap();

        fork.process(&1).unwrap();
        fork.process(&9).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completion_first_skips_branches_and_freezes() {
        let branch_hits = Arc::new(AtomicUsize::new(0));
        let done_hits = Arc::new(AtomicUsize::new(0));
        let counter = done_hits.clone();
        let completion = completion_at(3).on_match(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let fork = Fork::new(vec![counting(&branch_hits, |_| true)], completion, false, None).unwrap();

        assert_eq!(fork.get_result(), None);
        fork.process(&3).unwrap();
        assert!(fork.is_done());
        assert_eq!(fork.get_result(), Some("done at 3".to_string()));
        assert_eq!(branch_hits.load(Ordering::SeqCst), 0);

        fork.process(&3).unwrap();
        fork.process(&4).unwrap();
        assert_eq!(done_hits.load(Ordering::SeqCst), 1);
        assert_eq!(branch_hits.load(Ordering::SeqCst), 0);
        assert_eq!(fork.get_result(), Some("done at 3".to_string()));
    }

    #[test]
    fn test_branch_callback_can_enable_completion() {
        let armed = Arc::new(AtomicUsize::new(0));
        let arm = armed.clone();
        let branch = Condition::matching(|n: &i32| *n == 2).on_match(move |_| {
            arm.store(1, Ordering::SeqCst);
        });
        let check = armed.clone();
        let completion = Condition::matching(move |_: &i32| check.load(Ordering::SeqCst) == 1)
            .stop_with("armed".to_string());
        let fork = Fork::new(vec![branch], completion, false, None).unwrap();

        fork.process(&1).unwrap();
        assert!(!fork.is_done());
        fork.process(&2).unwrap();
        assert_eq!(fork.get_result(), Some("armed".to_string()));
    }

    #[tokio::test]
    async fn test_join_returns_result() {
        let fork = Arc::new(Fork::new(vec![], completion_at(5), false, None).unwrap());
        let waiter = {
            let fork = fork.clone();
            tokio::spawn(async move { fork.join().await })
        };
        fork.process(&5).unwrap();
        assert_eq!(waiter.await.unwrap(), Ok("done at 5".to_string()));
    }

    #[tokio::test]
    async fn test_join_expires() {
        let fork = Fork::new(vec![], completion_at(5), false, Some(Duration::from_millis(100))).unwrap();
        assert!(!fork.expired());
        let started = std::time::Instant::now();
        let err = fork.join().await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(matches!(err, WaitError::Expired { .. }));
        assert!(fork.expired());
        assert!(!fork.is_done());
    }

    #[test]
    fn test_concurrent_process_completes_once() {
        let done_hits = Arc::new(AtomicUsize::new(0));
        let counter = done_hits.clone();
        let completion = completion_at(3).on_match(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let fork = Arc::new(Fork::new(vec![], completion, false, None).unwrap());
        let start = Arc::new(std::sync::Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let fork = fork.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    for _ in 0..50 {
                        fork.process(&3).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(done_hits.load(Ordering::SeqCst), 1);
        assert_eq!(fork.get_result(), Some("done at 3".to_string()));
    }

    #[test]
    fn test_leads_to_follows_substitutes() {
        let old = Arc::new(Fork::new(vec![], completion_at(1), false, None).unwrap());
        let new = Arc::new(Fork::new(vec![], completion_at(2), false, None).unwrap());
        let other = Arc::new(Fork::new(vec![], completion_at(3), false, None).unwrap());
        old.set_substitute(new.clone());

        assert!(old.leads_to(&old));
        assert!(old.leads_to(&new));
        assert!(!old.leads_to(&other));
        assert!(!new.leads_to(&old));
    }

    #[test]
    fn test_done_and_expired_are_independent() {
        let fork = Fork::new(vec![], completion_at(5), false, Some(Duration::ZERO)).unwrap();
        fork.process(&5).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(fork.is_done());
        assert!(fork.expired());
    }
}
