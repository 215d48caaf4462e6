use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time source used by dispatcher workers for quota math and throttling
/// sleeps. Injectable so throttling behavior can be tested deterministically.
pub trait Clock: Send + Sync {
    fn epoch_secs(&self) -> u64;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
