//! Bounded exponential backoff for transient remote failures.
//!
//! The schedule is `base, 2·base, 4·base, …` and stops at the last delay that
//! does not exceed the ceiling. A transient failure with no delay left is
//! fatal. The sleep itself goes through [`Sleeper`] so tests can record the
//! schedule instead of waiting it out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use harvest_core::config::BackoffConfig;
use harvest_core::RemoteError;

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub ceiling: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    /// Every delay the policy allows, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let ceiling = self.ceiling;
        std::iter::successors(Some(self.base), |d| d.checked_mul(2))
            .take_while(move |d| !d.is_zero() && *d <= ceiling)
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs(config.base_secs),
            Duration::from_secs(config.ceiling_secs),
        )
    }
}

// ---------------------------------------------------------------------------
// Sleep and cancellation
// ---------------------------------------------------------------------------

pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Shared cancellation flag, checked before each fetch batch and each sleep.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Runs a remote call under a [`BackoffPolicy`].
#[derive(Clone, Copy)]
pub struct Retrier<'a> {
    policy: BackoffPolicy,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
}

impl<'a> Retrier<'a> {
    pub fn new(policy: BackoffPolicy, sleeper: &'a dyn Sleeper, cancel: &'a CancelToken) -> Self {
        Self {
            policy,
            sleeper,
            cancel,
        }
    }

    /// Call `op` until it succeeds, fails non-transiently, or the schedule
    /// runs out.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, SyncError> {
        let mut delays = self.policy.delays();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(SyncError::Remote(err)),
                Err(err) => err,
            };
            let Some(delay) = delays.next() else {
                tracing::error!(what, attempts, error = %err, "retries exhausted");
                return Err(SyncError::RetriesExhausted {
                    attempts,
                    last: err,
                });
            };
            self.cancel.check()?;
            tracing::warn!(
                what,
                attempt = attempts,
                delay_secs = delay.as_secs(),
                error = %err,
                "transient remote failure, backing off",
            );
            self.sleeper.sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Duration>>);

    impl Sleeper for Recorder {
        fn sleep(&self, delay: Duration) {
            self.0.borrow_mut().push(delay);
        }
    }

    fn busy() -> RemoteError {
        RemoteError::Status {
            code: 429,
            reason: "Too Many Requests".into(),
            target: "esearch".into(),
        }
    }

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn default_schedule_stops_below_ceiling() {
        let policy = BackoffPolicy::from(&BackoffConfig::default());
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays, secs(&[30, 60, 120, 240, 480, 960, 1920]));
    }

    #[test]
    fn ceiling_equal_to_a_step_is_included() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(8));
        assert_eq!(policy.delays().collect::<Vec<_>>(), secs(&[1, 2, 4, 8]));
    }

    #[test]
    fn success_after_transient_failures() {
        let sleeper = Recorder::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new(
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60)),
            &sleeper,
            &cancel,
        );
        let mut calls = 0;
        let value = retrier
            .run("test", || {
                calls += 1;
                if calls < 3 {
                    Err(busy())
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(*sleeper.0.borrow(), secs(&[1, 2]));
    }

    #[test]
    fn exhaustion_carries_code_reason_and_target() {
        let sleeper = Recorder::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new(
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4)),
            &sleeper,
            &cancel,
        );
        let err = retrier.run("test", || Err::<(), _>(busy())).unwrap_err();
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 4, .. }), "got: {err}");
        assert!(err.to_string().contains("ErrCode:429 reason:Too Many Requests url:esearch"));
        assert_eq!(*sleeper.0.borrow(), secs(&[1, 2, 4]));
    }

    #[test]
    fn malformed_is_not_retried() {
        let sleeper = Recorder::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new(
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4)),
            &sleeper,
            &cancel,
        );
        let err = retrier
            .run("test", || {
                Err::<(), _>(RemoteError::Malformed {
                    target: "efetch".into(),
                    message: "bad".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));
        assert!(sleeper.0.borrow().is_empty());
    }

    #[test]
    fn cancellation_is_checked_before_sleeping() {
        let sleeper = Recorder::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let retrier = Retrier::new(
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4)),
            &sleeper,
            &cancel,
        );
        let err = retrier.run("test", || Err::<(), _>(busy())).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(sleeper.0.borrow().is_empty());
    }
}
