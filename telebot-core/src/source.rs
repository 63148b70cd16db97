//! Update sources: where the wait engine pulls inbound events from.
//!
//! [`UpdateSource`] is transport-agnostic; the HTTP client implements it over its poll queue, and
//! [`UpdateQueue`] is the in-memory FIFO both the client and tests use.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Producer of inbound events. Pulling is non-blocking and consuming: an event is returned once.
pub trait UpdateSource: Send + Sync {
    type Event;

    /// Pops the oldest pending event, if any.
    fn next_pending(&self) -> Option<Self::Event>;

    /// Number of events currently buffered.
    fn pending_count(&self) -> usize;

    /// Drains every currently buffered event, oldest first.
    fn fetch_pending(&self) -> Vec<Self::Event> {
        std::iter::from_fn(|| self.next_pending()).collect()
    }

    /// Asks the producer to poll at the given interval. Sources without a producer ignore it.
    fn set_poll_interval(&self, _interval: Duration) {}
}

/// Mutex-guarded FIFO of events with a "news" flag set on every push.
#[derive(Debug)]
pub struct UpdateQueue<T> {
    items: Mutex<VecDeque<T>>,
    news: AtomicBool,
}

impl<T> Default for UpdateQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UpdateQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            news: AtomicBool::new(false),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        self.items().push_back(item);
        self.news.store(true, Ordering::SeqCst);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let mut queue = self.items();
        let before = queue.len();
        queue.extend(items);
        if queue.len() > before {
            self.news.store(true, Ordering::SeqCst);
        }
    }

    pub fn next(&self) -> Option<T> {
        self.items().pop_front()
    }

    pub fn drain(&self) -> Vec<T> {
        self.items().drain(..).collect()
    }

    /// Removes and returns the items matching `pred`, keeping the others queued in order.
    pub fn drain_where(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut queue = self.items();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        for item in queue.drain(..) {
            if pred(&item) {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }
        *queue = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// True if something was pushed since the last call.
    pub fn take_news(&self) -> bool {
        self.news.swap(false, Ordering::SeqCst)
    }
}

impl<T: Send> UpdateSource for UpdateQueue<T> {
    type Event = T;

    fn next_pending(&self) -> Option<T> {
        self.next()
    }

    fn pending_count(&self) -> usize {
        self.len()
    }
}
