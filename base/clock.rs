// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! Clock interface and implementations, for testability.
//!
//! Grounded in the teacher's `base::clock::Clocks`, narrowed to the two
//! operations the session-binning sink actually needs: reading wall-clock
//! milliseconds and sleeping. There is no monotonic/realtime distinction to
//! make here (unlike the teacher's video-recording core), since every
//! timestamp this crate handles -- event times, sync ages, reconnect
//! delays -- is wall-clock milliseconds by contract (spec.md §3).

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Abstract interface to the wall clock, so that sync-age and reconnect-delay
/// logic can be driven deterministically in tests.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Blocks the calling thread for `d`. A no-op for fake clocks.
    fn sleep(&self, d: Duration);
}

#[derive(Copy, Clone, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> i64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        since_epoch.as_millis() as i64
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// A clock whose reading is advanced explicitly by a test, never by the
/// passage of real time. `sleep` is a no-op: the tests that use `FakeClock`
/// advance it and re-invoke the sink rather than blocking a thread.
#[derive(Clone)]
pub struct FakeClock(Arc<Mutex<i64>>);

impl FakeClock {
    pub fn new(start_ms: i64) -> Self {
        FakeClock(Arc::new(Mutex::new(start_ms)))
    }

    pub fn set(&self, ms: i64) {
        *self.0.lock().unwrap() = ms;
    }

    pub fn advance(&self, d: Duration) {
        *self.0.lock().unwrap() += d.as_millis() as i64;
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        *self.0.lock().unwrap()
    }

    fn sleep(&self, _d: Duration) {
        // Tests drive time forward with `advance`/`set`; a real sleep here
        // would just make them slow for no benefit.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_explicitly() {
        let c = FakeClock::new(1_000);
        assert_eq!(c.now_ms(), 1_000);
        c.advance(Duration::from_millis(500));
        assert_eq!(c.now_ms(), 1_500);
        c.set(42);
        assert_eq!(c.now_ms(), 42);
    }
}
