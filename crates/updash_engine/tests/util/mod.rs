#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use updash_engine::{ApiRequest, Clock, Headers, HttpPerformer, PerformError, RawResponse};

/// Deterministic clock: `sleep` records the request and advances virtual
/// time instead of blocking, so throttling behavior can be asserted exactly.
#[derive(Debug)]
pub struct ManualClock {
    epoch_millis: Mutex<u128>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn starting_at(epoch_secs: u64) -> Self {
        Self {
            epoch_millis: Mutex::new(u128::from(epoch_secs) * 1000),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn slept_for(&self, duration: Duration) -> bool {
        self.sleeps.lock().unwrap().contains(&duration)
    }
}

impl Clock for ManualClock {
    fn epoch_secs(&self) -> u64 {
        (*self.epoch_millis.lock().unwrap() / 1000) as u64
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        *self.epoch_millis.lock().unwrap() += duration.as_millis();
        // Idle workers poll in a loop; without a real nap they would spin.
        std::thread::sleep(Duration::from_micros(200));
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> RawResponse {
    let mut map = Headers::new();
    for (name, value) in headers {
        map.insert(name.to_string(), value.to_string());
    }
    RawResponse {
        status,
        headers: map,
        body: body.to_string(),
    }
}

pub fn ok_response() -> RawResponse {
    response(200, &[], "{}")
}

/// Performer that replays a fixed script of responses in submission order
/// and records every URL it was asked to hit.
pub struct ScriptedPerformer {
    script: Mutex<VecDeque<Result<RawResponse, PerformError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPerformer {
    pub fn new(script: Vec<Result<RawResponse, PerformError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl HttpPerformer for ScriptedPerformer {
    fn perform(&self, request: &ApiRequest) -> Result<RawResponse, PerformError> {
        self.calls.lock().unwrap().push(request.url.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ok_response()))
    }
}

/// Performer that parks every call until the gate is opened, used to pin
/// requests in flight while the test inspects queue state.
#[derive(Default)]
pub struct GatedPerformer {
    open: Mutex<bool>,
    cond: Condvar,
    calls: Mutex<Vec<String>>,
}

impl GatedPerformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl HttpPerformer for GatedPerformer {
    fn perform(&self, request: &ApiRequest) -> Result<RawResponse, PerformError> {
        self.calls.lock().unwrap().push(request.url.clone());
        let guard = self.open.lock().unwrap();
        let _guard = self
            .cond
            .wait_while(guard, |open| !*open)
            .unwrap();
        Ok(ok_response())
    }
}

/// Polls `predicate` until it holds or the deadline passes.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}
