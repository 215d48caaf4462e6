//! Updash engine: rate-limited request dispatch and background pane refresh.
mod clock;
mod dispatcher;
mod http;
mod promise;
mod quota;
mod scheduler;
mod task;
mod types;

pub use clock::{Clock, SystemClock};
pub use dispatcher::{Dispatcher, DispatcherSettings, DispatcherStatus, Throttle};
pub use http::{Credentials, HttpPerformer, PerformError, PerformerSettings, ReqwestPerformer};
pub use promise::{Promise, WaitTimedOut};
pub use quota::{
    QuotaTracker, RateWindow, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RESOURCE,
    HEADER_RETRY_AFTER,
};
pub use scheduler::{ContentProvider, PaneBuilder, PaneScheduler};
pub use task::{TaskHandle, TaskPanicked};
pub use types::{ApiRequest, DispatchError, Headers, Method, RawResponse};
