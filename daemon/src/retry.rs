use crate::db::{self, Storage};
use buildfarm_common::config::DatabaseConfig;
use buildfarm_common::errors::*;
use diesel::SqliteConnection;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// Attached as context once a transaction failed recoverably on every
/// permitted attempt.
#[derive(Debug, thiserror::Error)]
#[error("Storage transaction failed after {attempts} attempts")]
pub struct RetriesExhausted {
    pub attempts: u32,
}

pub fn is_exhausted(err: &Error) -> bool {
    err.downcast_ref::<RetriesExhausted>().is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub retry_max: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_max: u32, base_delay: Duration, max_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            retry_max,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> RetryPolicy {
        RetryPolicy::new(
            config.retry_max(),
            Duration::from_millis(config.retry_delay_ms()),
            Duration::from_millis(config.max_retry_delay_ms()),
        )
    }

    pub fn no_backoff(retry_max: u32) -> RetryPolicy {
        RetryPolicy::new(retry_max, Duration::ZERO, Duration::ZERO)
    }

    fn attempts(&self) -> u32 {
        self.retry_max.max(1)
    }

    /// Upper bound of the sleep before the given retry, `None` means the
    /// thread only yields.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        if retry <= 1 || self.max_delay.is_zero() {
            return None;
        }
        let exp = (retry - 2).min(16);
        let delay = self.base_delay.saturating_mul(1 << exp);
        Some(delay.min(self.max_delay))
    }

    fn backoff(&self, retry: u32) {
        match self.delay(retry) {
            Some(delay) if !delay.is_zero() => {
                let max = delay.as_millis() as u64;
                let millis = rand::thread_rng().gen_range(max / 2..=max);
                thread::sleep(Duration::from_millis(millis));
            }
            _ => thread::yield_now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub max: u32,
}

impl Attempt {
    pub fn is_last(&self) -> bool {
        self.number >= self.max
    }
}

/// Run `f` in a storage transaction, retrying recoverable failures.
///
/// Every attempt gets a fresh transaction, `f` must not keep anything it
/// read from a failed attempt. Non-recoverable errors are returned right
/// away, running out of attempts returns the last error with
/// [`RetriesExhausted`] attached.
pub fn transact<S, T, F>(storage: &S, policy: &RetryPolicy, mut f: F) -> Result<T>
where
    S: Storage,
    F: FnMut(&mut SqliteConnection, Attempt) -> Result<T>,
{
    let max = policy.attempts();
    let mut number = 1;
    loop {
        let attempt = Attempt { number, max };
        match storage.transaction(|connection| f(connection, attempt)) {
            Ok(value) => return Ok(value),
            Err(err) if db::is_recoverable(&err) => {
                if attempt.is_last() {
                    warn!(
                        "Giving up on storage transaction after {} attempts: {:#}",
                        max, err
                    );
                    return Err(err.context(RetriesExhausted { attempts: max }));
                }
                debug!(
                    "Recoverable storage failure (attempt {}/{}): {:#}",
                    number, max, err
                );
                policy.backoff(number);
                number += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
