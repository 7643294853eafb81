// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Wait for a condition to become true

use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// Errors raised while waiting
#[derive(Debug, Error)]
pub enum WaitError {
    /// The condition was not met in time
    #[error("{message}")]
    TimeoutExpired {
        /// What the user is told
        message: String,
        /// The last error the condition reported, when errors were suppressed
        last_error: Option<String>,
    },

    /// The condition failed and errors are not suppressed
    #[error(transparent)]
    Condition(#[from] anyhow::Error),
}

/// Options for [`until`]
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Allocated time; `None` or zero waits forever
    pub timeout: Option<Duration>,
    /// Delay between attempts, never longer than the timeout
    pub retry: Duration,
    /// Keep retrying when the condition fails
    pub suppress_errors: bool,
    /// Replaces the default timeout message
    pub failure_message: Option<String>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(300)),
            retry: Duration::from_millis(500),
            suppress_errors: false,
            failure_message: None,
        }
    }
}

impl WaitOptions {
    /// Wait at most `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait `retry` between attempts
    #[must_use]
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    /// Treat a failing condition as not met yet
    #[must_use]
    pub fn suppress_errors(mut self) -> Self {
        self.suppress_errors = true;
        self
    }

    /// Use a custom message on timeout
    #[must_use]
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }
}

/// Call `condition` until it returns `Ok(true)`
///
/// Time spent in the condition is deducted from the retry delay.
///
/// # Errors
///
/// `TimeoutExpired` when time runs out, or the condition's own error when
/// errors are not suppressed.
pub fn until<F>(mut condition: F, options: &WaitOptions) -> Result<(), WaitError>
where
    F: FnMut() -> anyhow::Result<bool>,
{
    let timeout = options.timeout.filter(|timeout| !timeout.is_zero());
    let retry = timeout.map_or(options.retry, |timeout| options.retry.min(timeout));
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    let mut last_error = None;
    let mut attempts = 0_u64;

    loop {
        let started = Instant::now();
        attempts += 1;
        match condition() {
            Ok(true) => return Ok(()),
            Ok(false) => last_error = None,
            Err(error) if options.suppress_errors => last_error = Some(format!("{error:#}")),
            Err(error) => return Err(WaitError::Condition(error)),
        }

        let pause = retry.saturating_sub(started.elapsed());
        match deadline {
            Some(deadline) if Instant::now() + pause > deadline => break,
            _ => {
                trace!("condition not met after {attempts} attempt(s)");
                sleep(pause);
            }
        }
    }

    let message = options.failure_message.clone().unwrap_or_else(|| match &last_error {
        Some(error) => format!("Timed out waiting for condition: {error}"),
        None => format!("Timed out waiting for condition after {attempts} attempt(s)."),
    });
    Err(WaitError::TimeoutExpired { message, last_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn make_test_options() -> WaitOptions {
        WaitOptions::default()
            .with_timeout(Duration::from_millis(200))
            .with_retry(Duration::from_millis(10))
    }

    #[test]
    fn test_condition_met() {
        let mut calls = 0;
        let result = until(
            || {
                calls += 1;
                Ok(calls == 3)
            },
            &make_test_options(),
        );
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_timeout() {
        let options = make_test_options().with_failure_message("never");
        match until(|| Ok(false), &options) {
            Err(WaitError::TimeoutExpired { message, last_error }) => {
                assert_eq!(message, "never");
                assert!(last_error.is_none());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_errors_raise_unless_suppressed() {
        let result = until(|| bail!("broken"), &make_test_options());
        assert!(matches!(result, Err(WaitError::Condition(_))));

        let result = until(|| bail!("broken"), &make_test_options().suppress_errors());
        match result {
            Err(WaitError::TimeoutExpired { message, last_error }) => {
                assert_eq!(last_error.as_deref(), Some("broken"));
                assert!(message.ends_with("broken"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
