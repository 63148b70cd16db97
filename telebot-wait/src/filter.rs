use std::fmt;
use std::sync::Arc;

use telebot_core::{PredicateError, WaitError, WaitResult};
use tracing::debug;

type Predicate<E> = dyn Fn(&E) -> Result<bool, PredicateError> + Send + Sync;

/// A single predicate over an event.
pub struct Filter<E> {
    predicate: Arc<Predicate<E>>,
    label: String,
}

impl<E> Filter<E> {
    /// Wraps an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::fallible(move |event| Ok(predicate(event)))
    }

    /// Wraps a predicate that may fail.
    ///
    /// [`PredicateError::MissingField`] makes [`evaluate`](Self::evaluate) report `false`;
    /// [`PredicateError::Failed`] is returned to the caller.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            label: "filter".to_string(),
        }
    }

    /// Names the filter in logs and errors.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn evaluate(&self, event: &E) -> WaitResult<bool> {
        match (self.predicate)(event) {
            Ok(matched) => Ok(matched),
            Err(PredicateError::MissingField(field)) => {
                debug!(filter = %self.label, field, "event lacks field, filter not met");
                Ok(false)
            }
            Err(PredicateError::Failed(message)) => Err(WaitError::Predicate {
                filter: self.label.clone(),
                message,
            }),
        }
    }
}

impl<E> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            label: self.label.clone(),
        }
    }
}

impl<E> fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({:?})", self.label)
    }
}
