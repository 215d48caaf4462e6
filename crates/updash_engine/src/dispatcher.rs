use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dash_logging::{dash_debug, dash_warn};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::http::HttpPerformer;
use crate::promise::Promise;
use crate::quota::{QuotaTracker, RateWindow, HEADER_RETRY_AFTER};
use crate::types::{ApiRequest, DispatchError, RawResponse};

/// Tuning knobs for the dispatcher.
///
/// The delay thresholds are empirical values inherited from observed upstream
/// behavior; they are configuration, not invariants.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub max_queue_size: usize,
    pub max_workers: usize,
    /// Global pause after every successful call, per worker.
    pub min_delay_between_requests: Duration,
    /// Minimum spacing between search-API calls, in seconds.
    pub min_search_interval_secs: u64,
    /// Below this many remaining search calls, slow down hard.
    pub search_low_threshold: u64,
    pub search_low_delay: Duration,
    /// Above this many remaining general calls, no delay at all.
    pub general_plenty_threshold: u64,
    pub general_scarce_threshold: u64,
    pub general_low_threshold: u64,
    pub general_scarce_delay: Duration,
    pub general_low_delay: Duration,
    pub general_default_delay: Duration,
    /// Retry delay when a quota failure carries no usable reset hint.
    pub retry_fallback: Duration,
    /// How long `execute` waits for a submitted request to settle.
    pub wait_timeout: Duration,
    /// Worker nap when the queue is empty.
    pub idle_poll: Duration,
    /// Quota-retry ceiling per request; `None` retries indefinitely.
    pub max_retries: Option<u32>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 20,
            max_workers: 5,
            min_delay_between_requests: Duration::from_secs(1),
            min_search_interval_secs: 5,
            search_low_threshold: 5,
            search_low_delay: Duration::from_secs(3),
            general_plenty_threshold: 50,
            general_scarce_threshold: 10,
            general_low_threshold: 25,
            general_scarce_delay: Duration::from_secs(2),
            general_low_delay: Duration::from_secs(1),
            general_default_delay: Duration::from_millis(500),
            retry_fallback: Duration::from_secs(60),
            wait_timeout: Duration::from_secs(120),
            idle_poll: Duration::from_millis(100),
            max_retries: None,
        }
    }
}

/// Pre-dispatch throttling decision for the request at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    /// Sleep this long, then dispatch.
    Dispatch(Duration),
    /// Sleep this long, put the request back at the front, and re-check the
    /// quota state fresh.
    Requeue(Duration),
}

impl DispatcherSettings {
    /// Pure throttling decision from a quota snapshot, checked in priority
    /// order: search spacing, search exhaustion, search scarcity, general
    /// exhaustion, then the dynamic general delay.
    pub fn throttle_for(
        &self,
        general: RateWindow,
        search: RateWindow,
        last_search_epoch: Option<u64>,
        now: u64,
    ) -> Throttle {
        if let Some(last) = last_search_epoch {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.min_search_interval_secs {
                return Throttle::Dispatch(Duration::from_secs(
                    self.min_search_interval_secs - elapsed,
                ));
            }
        }

        if let Some(reset_at) = search.exhausted_until(now) {
            return Throttle::Requeue(Duration::from_secs(reset_at - now + 1));
        }
        if matches!(search.remaining, Some(remaining) if remaining < self.search_low_threshold) {
            return Throttle::Dispatch(self.search_low_delay);
        }

        if let Some(reset_at) = general.exhausted_until(now) {
            return Throttle::Requeue(Duration::from_secs(reset_at - now + 1));
        }
        match general.remaining {
            Some(remaining) if remaining > self.general_plenty_threshold => {
                Throttle::Dispatch(Duration::ZERO)
            }
            Some(remaining) if remaining < self.general_scarce_threshold => {
                Throttle::Dispatch(self.general_scarce_delay)
            }
            Some(remaining) if remaining < self.general_low_threshold => {
                Throttle::Dispatch(self.general_low_delay)
            }
            Some(_) => Throttle::Dispatch(self.general_default_delay),
            None => Throttle::Dispatch(Duration::ZERO),
        }
    }

    fn retry_delay(&self, response: &RawResponse, general: RateWindow, now: u64) -> Duration {
        if let Some(secs) = response
            .header(HEADER_RETRY_AFTER)
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            return Duration::from_secs(secs + 1);
        }
        if let Some(reset_at) = general.reset_at {
            if reset_at > now {
                return Duration::from_secs(reset_at - now + 1);
            }
        }
        self.retry_fallback
    }
}

/// Read-only diagnostic snapshot for an operator/debug surface.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatus {
    pub queue_depth: usize,
    pub in_flight: Vec<String>,
    pub workers: usize,
    pub running: bool,
    pub last_completed: Option<String>,
    pub last_error: Option<String>,
    pub general: RateWindow,
    pub search: RateWindow,
    pub next_search_available_secs: Option<u64>,
}

struct QueuedRequest {
    request: ApiRequest,
    promise: Promise<RawResponse, DispatchError>,
    /// Epoch seconds at first enqueue; retries keep the original value.
    queued_at: u64,
    attempts: u32,
}

struct Inner {
    settings: DispatcherSettings,
    performer: Arc<dyn HttpPerformer>,
    clock: Arc<dyn Clock>,
    quota: QuotaTracker,
    queue: Mutex<VecDeque<QueuedRequest>>,
    running: AtomicBool,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    in_flight: Mutex<Vec<String>>,
    last_completed: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
}

/// Rate-limited request dispatcher shared by every pane.
///
/// All outbound calls funnel through one bounded FIFO queue drained by a
/// fixed worker pool. Quota failures (429 and disguised 403) are retried
/// internally; every other failure is surfaced to the caller immediately.
///
/// Construct once at startup and hand clones to whatever needs it.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(settings: DispatcherSettings, performer: Arc<dyn HttpPerformer>) -> Self {
        Self::with_clock(settings, performer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: DispatcherSettings,
        performer: Arc<dyn HttpPerformer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                performer,
                clock,
                quota: QuotaTracker::default(),
                queue: Mutex::new(VecDeque::new()),
                running: AtomicBool::new(false),
                workers: Mutex::new(Vec::new()),
                in_flight: Mutex::new(Vec::new()),
                last_completed: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Enqueues a request and returns its promise.
    ///
    /// Fails fast with `QueueFull` (promise pre-rejected, no network contact)
    /// when the queue is at capacity. The worker pool starts lazily on the
    /// first accepted submission.
    pub fn submit(&self, request: ApiRequest) -> Promise<RawResponse, DispatchError> {
        let promise = Promise::new();
        {
            let mut queue = self.inner.queue.lock().expect("queue lock");
            if queue.len() >= self.inner.settings.max_queue_size {
                dash_warn!(
                    "dispatch queue full, rejecting {} ({} queued)",
                    request.operation(),
                    queue.len()
                );
                promise.reject(DispatchError::QueueFull {
                    capacity: self.inner.settings.max_queue_size,
                });
                return promise;
            }
            queue.push_back(QueuedRequest {
                request,
                promise: promise.clone(),
                queued_at: self.inner.clock.epoch_secs(),
                attempts: 0,
            });
        }
        self.ensure_workers();
        promise
    }

    /// Submit and block the calling thread until the request settles.
    ///
    /// A timeout abandons the wait but does not cancel the request; it may
    /// still complete or keep retrying in the background.
    pub fn execute(&self, request: ApiRequest) -> Result<RawResponse, DispatchError> {
        let operation = request.operation();
        let promise = self.submit(request);
        match promise.wait(self.inner.settings.wait_timeout) {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                operation,
                queue_depth: self.queue_depth(),
                seconds: self.inner.settings.wait_timeout.as_secs(),
            }),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().expect("queue lock").len()
    }

    pub fn status(&self) -> DispatcherStatus {
        let now = self.inner.clock.epoch_secs();
        let next_search_available_secs = self.inner.quota.last_search_epoch().map(|last| {
            (last + self.inner.settings.min_search_interval_secs).saturating_sub(now)
        });
        DispatcherStatus {
            queue_depth: self.queue_depth(),
            in_flight: self.inner.in_flight.lock().expect("in-flight lock").clone(),
            workers: self.inner.workers.lock().expect("workers lock").len(),
            running: self.inner.running.load(Ordering::SeqCst),
            last_completed: self
                .inner
                .last_completed
                .lock()
                .expect("status lock")
                .clone(),
            last_error: self.inner.last_error.lock().expect("status lock").clone(),
            general: self.inner.quota.general(),
            search: self.inner.quota.search(),
            next_search_available_secs,
        }
    }

    /// Signals workers to stop once the queue is drained, then joins them.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let handles: Vec<_> = self
            .inner
            .workers
            .lock()
            .expect("workers lock")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn ensure_workers(&self) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let mut workers = self.inner.workers.lock().expect("workers lock");
        for index in 0..self.inner.settings.max_workers {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name(format!("dispatch-worker-{index}"))
                .spawn(move || worker_loop(inner))
                .expect("spawn dispatch worker");
            workers.push(handle);
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let item = inner.queue.lock().expect("queue lock").pop_front();
        let Some(item) = item else {
            if !inner.running.load(Ordering::SeqCst) {
                break;
            }
            inner.clock.sleep(inner.settings.idle_poll);
            continue;
        };
        process_request(&inner, item);
    }
}

fn process_request(inner: &Inner, item: QueuedRequest) {
    let operation = item.request.operation();
    let draining = !inner.running.load(Ordering::SeqCst);

    let now = inner.clock.epoch_secs();
    let throttle = inner.settings.throttle_for(
        inner.quota.general(),
        inner.quota.search(),
        inner.quota.last_search_epoch(),
        now,
    );
    match throttle {
        Throttle::Requeue(delay) if !draining => {
            dash_debug!("quota exhausted, holding {operation} for {delay:?}");
            inner.clock.sleep(delay);
            inner
                .queue
                .lock()
                .expect("queue lock")
                .push_front(item);
            return;
        }
        Throttle::Requeue(_) => {
            // Draining for shutdown: dispatch without the quota hold.
        }
        Throttle::Dispatch(delay) if !delay.is_zero() => inner.clock.sleep(delay),
        Throttle::Dispatch(_) => {}
    }

    inner
        .in_flight
        .lock()
        .expect("in-flight lock")
        .push(operation.clone());
    if item.request.is_search() {
        inner.quota.note_search_request(inner.clock.epoch_secs());
    }
    let started = inner.clock.epoch_secs();
    let outcome = inner.performer.perform(&item.request);
    finish_in_flight(inner, &operation);

    match outcome {
        Ok(response) if response.is_success() => {
            inner.quota.record_response(&response);
            item.promise.resolve(response);
            let elapsed = inner.clock.epoch_secs().saturating_sub(started);
            let queued_for = started.saturating_sub(item.queued_at);
            *inner.last_completed.lock().expect("status lock") =
                Some(format!("{operation} ({elapsed}s)"));
            dash_debug!("completed {operation} in {elapsed}s ({queued_for}s queued)");
            inner.clock.sleep(inner.settings.min_delay_between_requests);
        }
        Ok(response) if response.status == 429 => {
            record_error(inner, format!("rate limit exceeded: {operation}"));
            retry_quota_failure(inner, item, &response, draining);
        }
        Ok(response) if response.status == 403 => {
            record_error(inner, format!("forbidden: {operation}"));
            if is_disguised_rate_limit(&response.body) {
                retry_quota_failure(inner, item, &response, draining);
            } else {
                item.promise.reject(DispatchError::Forbidden {
                    operation,
                    message: snippet(&response.body),
                });
            }
        }
        Ok(response) => {
            record_error(inner, format!("http {}: {operation}", response.status));
            item.promise.reject(DispatchError::HttpStatus {
                status: response.status,
                operation,
            });
        }
        Err(err) => {
            record_error(inner, format!("error: {err}"));
            item.promise.reject(DispatchError::Transport {
                operation,
                message: err.to_string(),
            });
        }
    }
}

/// Quota failure (429 or disguised 403): sleep out the penalty and put the
/// same request back at the front of the queue. The caller's promise stays
/// pending; these failures are never surfaced unless a retry ceiling is hit
/// or the dispatcher is draining for shutdown.
fn retry_quota_failure(inner: &Inner, mut item: QueuedRequest, response: &RawResponse, draining: bool) {
    let operation = item.request.operation();
    item.attempts += 1;

    if let Some(max_retries) = inner.settings.max_retries {
        if item.attempts > max_retries {
            dash_warn!("giving up on {operation} after {} attempts", item.attempts);
            item.promise.reject(DispatchError::RetriesExhausted {
                attempts: item.attempts,
                operation,
            });
            return;
        }
    }
    if draining {
        item.promise.reject(DispatchError::HttpStatus {
            status: response.status,
            operation,
        });
        return;
    }

    let now = inner.clock.epoch_secs();
    let delay = inner
        .settings
        .retry_delay(response, inner.quota.general(), now);
    dash_warn!(
        "quota failure ({}) on {operation}, retrying in {delay:?} (attempt {})",
        response.status,
        item.attempts
    );
    inner.clock.sleep(delay);
    inner.queue.lock().expect("queue lock").push_front(item);
}

/// Upstream sometimes reports quota abuse as a 403 with a marker in the body.
fn is_disguised_rate_limit(body: &str) -> bool {
    body.contains("rate limit") || body.contains("abuse")
}

fn finish_in_flight(inner: &Inner, operation: &str) {
    let mut in_flight = inner.in_flight.lock().expect("in-flight lock");
    if let Some(index) = in_flight.iter().position(|entry| entry == operation) {
        in_flight.remove(index);
    }
}

fn record_error(inner: &Inner, message: String) {
    *inner.last_error.lock().expect("status lock") = Some(message);
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(index, _)| *index < MAX)
            .last()
            .map(|(index, ch)| index + ch.len_utf8())
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    }
}
