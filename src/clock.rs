use std::time::{Duration, Instant};

/// Time source behind every wait in the pipeline.
///
/// The external UI surface offers no push notifications, so the worker polls.
/// Routing the polls through this trait lets tests drive the loops with a
/// fake clock instead of sleeping in wall-clock time.
pub trait Clock: Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A bounded polling wait: check a condition at a fixed interval until it
/// yields a value or the deadline passes.
pub struct Deadline<'a> {
    clock: &'a dyn Clock,
    end: Instant,
    interval: Duration,
}

impl<'a> Deadline<'a> {
    pub fn after(clock: &'a dyn Clock, timeout: Duration, interval: Duration) -> Self {
        Self {
            clock,
            end: clock.now() + timeout,
            interval,
        }
    }

    pub fn expired(&self) -> bool {
        self.clock.now() >= self.end
    }

    /// Poll `f` every interval until it returns `Some` or the deadline
    /// passes. The condition is always checked at least once.
    pub fn poll_until<T, F>(&self, mut f: F) -> Option<T>
    where
        F: FnMut() -> Option<T>,
    {
        loop {
            if let Some(v) = f() {
                return Some(v);
            }
            if self.expired() {
                return None;
            }
            self.clock.sleep(self.interval);
        }
    }
}
