//! Bounded retry with fixed backoff for stage commands.
//!
//! Every stage operation runs through [`RetryPolicy::run`]. A failing attempt is logged and
//! followed by a fixed sleep. Once `max_attempts` attempts have failed the policy gives up and
//! returns `T::default()`, the failure value of the operation (`false` for acknowledgements,
//! `None` for queries). The underlying error is logged but never returned, so callers cannot
//! tell a dead link from a rejected command.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

pub const MAX_ATTEMPTS: u32 = 8;
pub const RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `op` until it succeeds or the attempt budget is exhausted.
    pub fn run<T, E, F>(&self, name: &str, mut op: F) -> T
    where
        T: Default,
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        for attempt in 1..=self.max_attempts {
            match op() {
                Ok(value) => return value,
                Err(err) => {
                    warn!("{} failed, attempt {}/{}: {}", name, attempt, self.max_attempts, err);
                    if attempt < self.max_attempts {
                        thread::sleep(self.delay);
                    }
                }
            }
        }
        error!("{} failed {} times, giving up", name, self.max_attempts);
        T::default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, RETRY_DELAY)
    }
}
