use std::fmt;
use std::sync::Arc;

use telebot_core::WaitResult;

use crate::filter::Filter;

type Callback<E> = dyn Fn(&E) + Send + Sync;

/// What a matched condition yields to its waiter.
pub enum StopValue<E, R> {
    Constant(R),
    Computed(Arc<dyn Fn(&E) -> R + Send + Sync>),
}

impl<E, R: Clone> StopValue<E, R> {
    fn resolve(&self, event: &E) -> R {
        match self {
            StopValue::Constant(value) => value.clone(),
            StopValue::Computed(compute) => compute(event),
        }
    }
}

impl<E, R: Clone> Clone for StopValue<E, R> {
    fn clone(&self) -> Self {
        match self {
            StopValue::Constant(value) => StopValue::Constant(value.clone()),
            StopValue::Computed(compute) => StopValue::Computed(Arc::clone(compute)),
        }
    }
}

/// Conjunction of [`Filter`]s, optionally negated, with a callback and an optional stop value.
///
/// A condition never runs its own callback; the fork or driver owning it calls
/// [`invoke_callback`](Self::invoke_callback) once per matching event.
pub struct Condition<E, R> {
    filters: Vec<Filter<E>>,
    callback: Arc<Callback<E>>,
    stop_value: Option<StopValue<E, R>>,
    reversed: bool,
    name: Option<String>,
}

impl<E, R: Clone> Condition<E, R> {
    /// Condition over the given filters, with a no-op callback and no stop value.
    pub fn new(filters: impl IntoIterator<Item = Filter<E>>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
            callback: Arc::new(|_: &E| {}),
            stop_value: None,
            reversed: false,
            name: None,
        }
    }

    /// Condition over a single infallible predicate.
    pub fn matching<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::new([Filter::new(predicate)])
    }

    pub fn with_filter(mut self, filter: Filter<E>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn on_match<F>(mut self, callback: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.callback = Arc::new(callback);
        self
    }

    pub fn stop_with(mut self, value: R) -> Self {
        self.stop_value = Some(StopValue::Constant(value));
        self
    }

    /// Stop value computed from the event that triggered the match.
    pub fn stop_with_fn<F>(mut self, compute: F) -> Self
    where
        F: Fn(&E) -> R + Send + Sync + 'static,
    {
        self.stop_value = Some(StopValue::Computed(Arc::new(compute)));
        self
    }

    /// Negates the match result.
    pub fn reversed(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// All filters hold (short-circuiting), negated when reversed.
    pub fn meet(&self, event: &E) -> WaitResult<bool> {
        let mut all = true;
        for filter in &self.filters {
            if !filter.evaluate(event)? {
                all = false;
                break;
            }
        }
        Ok(all != self.reversed)
    }

    pub fn invoke_callback(&self, event: &E) {
        (self.callback)(event)
    }

    pub fn has_stop_value(&self) -> bool {
        self.stop_value.is_some()
    }

    pub fn stop_value(&self, event: &E) -> Option<R> {
        self.stop_value.as_ref().map(|stop| stop.resolve(event))
    }
}

impl<E, R: Clone> Clone for Condition<E, R> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            callback: Arc::clone(&self.callback),
            stop_value: self.stop_value.clone(),
            reversed: self.reversed,
            name: self.name.clone(),
        }
    }
}

impl<E, R> fmt::Debug for Condition<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("filters", &self.filters)
            .field("reversed", &self.reversed)
            .field("has_stop_value", &self.stop_value.is_some())
            .finish()
    }
}
