use std::sync::Mutex;

use serde::Serialize;

use crate::types::RawResponse;

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RESOURCE: &str = "x-ratelimit-resource";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Remaining/limit/reset snapshot for one API quota category.
///
/// Advisory throttling signal only: updated last-write-wins from response
/// headers, with no ordering guarantee across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RateWindow {
    pub remaining: Option<u64>,
    pub reset_at: Option<u64>,
    pub limit: Option<u64>,
}

impl RateWindow {
    /// True when the window is known-empty and its reset is still ahead.
    pub fn exhausted_until(&self, now: u64) -> Option<u64> {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if now < reset_at => Some(reset_at),
            _ => None,
        }
    }
}

/// Shared quota bookkeeping for the two upstream resources (general and
/// search) plus the time of the most recent search dispatch.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    general: Mutex<RateWindow>,
    search: Mutex<RateWindow>,
    last_search_epoch: Mutex<Option<u64>>,
}

impl QuotaTracker {
    pub fn general(&self) -> RateWindow {
        *self.general.lock().expect("quota lock")
    }

    pub fn search(&self) -> RateWindow {
        *self.search.lock().expect("quota lock")
    }

    pub fn last_search_epoch(&self) -> Option<u64> {
        *self.last_search_epoch.lock().expect("quota lock")
    }

    pub fn note_search_request(&self, epoch: u64) {
        *self.last_search_epoch.lock().expect("quota lock") = Some(epoch);
    }

    /// Folds a response's quota headers into the matching window, using the
    /// resource discriminator header to attribute them.
    pub fn record_response(&self, response: &RawResponse) {
        let remaining = parse_header(response, HEADER_REMAINING);
        let reset_at = parse_header(response, HEADER_RESET);
        let limit = parse_header(response, HEADER_LIMIT);
        if remaining.is_none() && reset_at.is_none() && limit.is_none() {
            return;
        }

        let window = RateWindow {
            remaining,
            reset_at,
            limit,
        };
        if response.header(HEADER_RESOURCE) == Some("search") {
            *self.search.lock().expect("quota lock") = window;
        } else {
            *self.general.lock().expect("quota lock") = window;
        }
    }
}

fn parse_header(response: &RawResponse, name: &str) -> Option<u64> {
    response.header(name)?.trim().parse().ok()
}
