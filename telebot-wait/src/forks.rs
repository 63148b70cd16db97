//! Registry of active forks, keyed by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telebot_core::{WaitError, WaitResult};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::condition::Condition;
use crate::fork::Fork;
use crate::lock;

/// Concurrently shared map of id to [`Fork`]. Every [`send`](Self::send) fans the event out to
/// all forks, then drops the ones whose deadline has passed.
pub struct Forks<E, R> {
    forks: Mutex<HashMap<String, Arc<Fork<E, R>>>>,
}

impl<E, R: Clone> Default for Forks<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R: Clone> Forks<E, R> {
    pub fn new() -> Self {
        Self {
            forks: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a fork and registers it. Returns its id (generated when `id` is `None`).
    pub fn attach(
        &self,
        branches: Vec<Condition<E, R>>,
        completion: Condition<E, R>,
        exclusive: bool,
        id: Option<String>,
        timeout: Option<Duration>,
    ) -> WaitResult<String> {
        let fork = Fork::new(branches, completion, exclusive, timeout)?;
        Ok(self.attach_fork(fork, id))
    }

    /// Registers a caller-built fork. An existing entry with the same id is overwritten.
    pub fn attach_fork(&self, fork: Fork<E, R>, id: Option<String>) -> String {
        self.insert(Arc::new(fork), id)
    }

    fn insert(&self, fork: Arc<Fork<E, R>>, id: Option<String>) -> String {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if lock(&self.forks).insert(id.clone(), fork).is_some() {
            warn!(fork_id = %id, "fork id already attached, previous fork dropped");
        }
        debug!(fork_id = %id, "fork attached");
        id
    }

    pub fn detach(&self, id: &str) -> WaitResult<Arc<Fork<E, R>>> {
        let fork = lock(&self.forks)
            .remove(id)
            .ok_or_else(|| WaitError::UnknownFork(id.to_string()))?;
        debug!(fork_id = %id, "fork detached");
        Ok(fork)
    }

    /// Builds a new fork and puts it in place of `id`.
    ///
    /// The new fork receives future events, and anyone joining the old fork is redirected to it.
    /// The new fork has no deadline.
    pub fn replace(
        &self,
        id: &str,
        branches: Vec<Condition<E, R>>,
        completion: Condition<E, R>,
        exclusive: bool,
    ) -> WaitResult<Arc<Fork<E, R>>> {
        let new_fork = Arc::new(Fork::new(branches, completion, exclusive, None)?);
        let mut forks = lock(&self.forks);
        let old = forks
            .get(id)
            .ok_or_else(|| WaitError::UnknownFork(id.to_string()))?;
        old.set_substitute(Arc::clone(&new_fork));
        forks.insert(id.to_string(), Arc::clone(&new_fork));
        debug!(fork_id = %id, "fork replaced");
        Ok(new_fork)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Fork<E, R>>> {
        lock(&self.forks).get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.forks).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.forks).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.forks).is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        lock(&self.forks).keys().cloned().collect()
    }

    /// Dispatches `event` to every registered fork, then detaches every expired one, done or not.
    ///
    /// Forks are processed outside the registry lock. All forks see the event even if one of them
    /// fails; the first failure is returned after the sweep.
    pub fn send(&self, event: &E) -> WaitResult<()> {
        let snapshot: Vec<(String, Arc<Fork<E, R>>)> = lock(&self.forks)
            .iter()
            .map(|(id, fork)| (id.clone(), Arc::clone(fork)))
            .collect();

        let mut first_error = None;
        let mut expired = Vec::new();
        for (id, fork) in snapshot {
            if let Err(e) = fork.process(event) {
                warn!(fork_id = %id, error = %e, "fork failed to process event");
                first_error.get_or_insert(e);
            }
            if fork.expired() {
                expired.push((id, fork));
            }
        }

        if !expired.is_empty() {
            let mut forks = lock(&self.forks);
            for (id, fork) in expired {
                // Only drop the fork that expired, not one that replaced it meanwhile.
                if forks.get(&id).is_some_and(|current| Arc::ptr_eq(current, &fork)) {
                    forks.remove(&id);
                    info!(fork_id = %id, done = fork.is_done(), "expired fork detached");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registers `fork`, waits for it (following replacements), and detaches it.
    ///
    /// The id is detached whether the join succeeded or expired; a sweep that already removed it
    /// is not an error.
    #[instrument(skip(self, fork))]
    pub async fn attach_join_detach(&self, fork: Fork<E, R>, id: Option<String>) -> WaitResult<R> {
        self.join_attached(Arc::new(fork), id).await
    }

    /// Builds a fork like [`attach`](Self::attach), then behaves like
    /// [`attach_join_detach`](Self::attach_join_detach). A construction error returns before
    /// anything is registered.
    #[instrument(skip(self, branches, completion))]
    pub async fn attach_join_detach_with(
        &self,
        branches: Vec<Condition<E, R>>,
        completion: Condition<E, R>,
        exclusive: bool,
        id: Option<String>,
        timeout: Option<Duration>,
    ) -> WaitResult<R> {
        let fork = Fork::new(branches, completion, exclusive, timeout)?;
        self.join_attached(Arc::new(fork), id).await
    }

    async fn join_attached(&self, fork: Arc<Fork<E, R>>, id: Option<String>) -> WaitResult<R> {
        let id = self.insert(Arc::clone(&fork), id);
        let outcome = fork.join().await;
        self.detach_owned(&id, &fork);
        outcome
    }

    /// Removes `id` only while it still maps to `fork` or to a fork that replaced it.
    fn detach_owned(&self, id: &str, fork: &Arc<Fork<E, R>>) {
        let mut forks = lock(&self.forks);
        let Some(current) = forks.get(id) else {
            debug!(fork_id = %id, "fork already swept before detach");
            return;
        };
        if fork.leads_to(current) {
            forks.remove(id);
            debug!(fork_id = %id, "fork detached");
        } else {
            warn!(fork_id = %id, "id taken over by another fork, left attached");
        }
    }
}
