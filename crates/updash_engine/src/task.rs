use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::promise::{Promise, WaitTimedOut};

/// The background closure panicked instead of returning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("background task panicked: {message}")]
pub struct TaskPanicked {
    pub message: String,
}

/// Handle to a spawned background computation.
///
/// Completion is observed by polling `is_finished`/`try_get` from the
/// render loop, or by a blocking `join` with timeout. There is no
/// cancellation: dropping the handle abandons the thread's result.
pub struct TaskHandle<T> {
    promise: Promise<T, TaskPanicked>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let promise = Promise::new();
        let settle = promise.clone();
        thread::spawn(move || match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => settle.resolve(value),
            Err(payload) => settle.reject(TaskPanicked {
                message: panic_message(payload.as_ref()),
            }),
        });
        Self { promise }
    }

    pub fn is_finished(&self) -> bool {
        self.promise.is_settled()
    }

    /// Non-blocking; `None` while the task is still running.
    pub fn try_get(&self) -> Option<Result<T, TaskPanicked>>
    where
        T: Clone,
    {
        self.promise.try_get()
    }

    pub fn join(&self, timeout: Duration) -> Result<Result<T, TaskPanicked>, WaitTimedOut>
    where
        T: Clone,
    {
        self.promise.wait(timeout)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
