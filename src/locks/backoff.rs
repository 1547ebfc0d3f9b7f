//! Quadratic backoff for contended lock acquisition.
//!
//! The n-th wait is `n² × 1ms`, jittered to between 75% and 125% of that,
//! with the multiplier capped at 1000 (one second).

use super::types::LockTimeout;
use rand::Rng;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

const INITIAL_BACKOFF: Duration = Duration::from_millis(1);
const MAX_MULTIPLIER: u32 = 1000;

/// Backoff schedule: multipliers 1, 4, 9, 16, ... up to [`MAX_MULTIPLIER`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    n: u32,
    multiplier: u32,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            n: 1,
            multiplier: 1,
        }
    }

    /// The un-jittered wait for the current step.
    pub(crate) fn nominal(&self) -> Duration {
        INITIAL_BACKOFF * self.multiplier
    }

    /// The jittered wait for the current step; advances the schedule.
    pub(crate) fn next_wait<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let per_mille: u32 = rng.random_range(750..1250);
        let wait = self.nominal() * per_mille / 1000;
        self.advance();
        wait
    }

    fn advance(&mut self) {
        // (n+1)² = n² + 2n + 1
        self.multiplier += 2 * self.n + 1;
        if self.multiplier > MAX_MULTIPLIER {
            self.multiplier = MAX_MULTIPLIER;
        } else {
            self.n += 1;
        }
    }
}

/// Run `attempt` until it succeeds, fails with something other than
/// `AlreadyExists`, or `timeout` runs out.
///
/// The timeout is measured from the first attempt. The last error is
/// returned on failure.
pub(crate) fn retry_with_backoff<T, F>(timeout: LockTimeout, mut attempt: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let start = Instant::now();
    let mut backoff = Backoff::new();
    let mut rng = rand::rng();

    loop {
        let err = match attempt() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => return Err(e),
            Err(e) => e,
        };

        match timeout {
            LockTimeout::Immediate => return Err(err),
            LockTimeout::After(limit) if start.elapsed() >= limit => return Err(err),
            _ => {}
        }

        let wait = backoff.next_wait(&mut rng);
        trace!(wait_ms = wait.as_millis() as u64, "lock contended, backing off");
        thread::sleep(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn contended() -> io::Error {
        io::Error::from(io::ErrorKind::AlreadyExists)
    }

    #[test]
    fn multipliers_are_squares_until_capped() {
        let mut backoff = Backoff::new();
        let mut seen = Vec::new();
        for _ in 0..40 {
            seen.push(backoff.multiplier);
            backoff.advance();
        }
        assert_eq!(&seen[..5], &[1, 4, 9, 16, 25]);
        assert_eq!(seen[30], 961);
        assert_eq!(seen[31], MAX_MULTIPLIER);
        assert_eq!(*seen.last().unwrap(), MAX_MULTIPLIER);
    }

    #[test]
    fn jittered_wait_stays_within_bounds() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let mut backoff = Backoff::new();
            for _ in 0..3 {
                backoff.advance();
            }
            let nominal = backoff.nominal();
            let wait = backoff.next_wait(&mut rng);
            assert!(wait >= nominal * 3 / 4);
            assert!(wait < nominal * 5 / 4);
        }
    }

    #[test]
    fn immediate_timeout_tries_once() {
        let calls = Cell::new(0);
        let result: io::Result<()> = retry_with_backoff(LockTimeout::Immediate, || {
            calls.set(calls.get() + 1);
            Err(contended())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn other_errors_abort_without_retry() {
        let calls = Cell::new(0);
        let result: io::Result<()> =
            retry_with_backoff(LockTimeout::After(Duration::from_secs(10)), || {
                calls.set(calls.get() + 1);
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            });
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_until_contention_clears() {
        let calls = Cell::new(0);
        let result = retry_with_backoff(LockTimeout::Forever, || {
            calls.set(calls.get() + 1);
            if calls.get() < 4 { Err(contended()) } else { Ok(calls.get()) }
        });
        assert_eq!(result.unwrap(), 4);
    }

    #[test]
    fn permanent_contention_fails_after_timeout() {
        let limit = Duration::from_millis(60);
        let start = Instant::now();
        let result: io::Result<()> =
            retry_with_backoff(LockTimeout::After(limit), || Err(contended()));
        let elapsed = start.elapsed();

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::AlreadyExists);
        assert!(elapsed >= limit, "gave up early after {:?}", elapsed);
        // The step that crosses 60ms is at most ~81ms nominal (9²), plus jitter.
        assert!(elapsed < limit + Duration::from_millis(500), "took {:?}", elapsed);
    }
}
