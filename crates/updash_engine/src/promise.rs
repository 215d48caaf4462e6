use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use thiserror::Error;

/// `wait` gave up before the promise settled. The producer side is not
/// cancelled and may still settle the promise later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out waiting for result")]
pub struct WaitTimedOut;

struct Shared<T, E> {
    value: Mutex<Option<Result<T, E>>>,
    cond: Condvar,
}

/// One-shot, thread-safe result handoff.
///
/// The first `resolve`/`reject` wins; later settlements are no-ops. The
/// settled value is retained for the promise's lifetime, so any number of
/// holders may query it, in any order. This is the only channel between
/// dispatcher workers and submitting threads, and (via `TaskHandle`) between
/// a pane's background run and its scheduler.
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Default for Promise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Promise<T, E> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(None),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&self, error: E) {
        self.settle(Err(error));
    }

    fn settle(&self, result: Result<T, E>) {
        let mut value = self.shared.value.lock().expect("promise lock");
        if value.is_some() {
            return;
        }
        *value = Some(result);
        self.shared.cond.notify_all();
    }

    pub fn is_settled(&self) -> bool {
        self.shared.value.lock().expect("promise lock").is_some()
    }
}

impl<T: Clone, E: Clone> Promise<T, E> {
    /// Non-blocking poll; `None` until settled, then the settled value on
    /// every call.
    pub fn try_get(&self) -> Option<Result<T, E>> {
        self.shared.value.lock().expect("promise lock").clone()
    }

    /// Blocks the calling thread until settled or `timeout` elapses.
    ///
    /// Idempotent: once settled, every `wait` yields the same result.
    pub fn wait(&self, timeout: Duration) -> Result<Result<T, E>, WaitTimedOut> {
        let value = self.shared.value.lock().expect("promise lock");
        let (value, _) = self
            .shared
            .cond
            .wait_timeout_while(value, timeout, |value| value.is_none())
            .expect("promise lock");
        match value.as_ref() {
            Some(result) => Ok(result.clone()),
            None => Err(WaitTimedOut),
        }
    }
}
