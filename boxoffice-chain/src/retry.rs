//! Bounded polling with a fixed delay between attempts.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "delay_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// No waiting between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    Exhausted { attempts: u32, last_error: Option<E> },
    Cancelled,
}

/// Runs `attempt` until it yields `Some`, at most `policy.attempts` times.
///
/// Errors from an attempt are treated like an empty result; the last one is
/// handed back if every attempt comes up empty. The token is checked before
/// each attempt and raced against each delay. There is no delay after the
/// final attempt.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut last_error = None;

    for n in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match attempt(n).await {
            Ok(Some(x)) => return Ok(x),
            Ok(None) => debug!(attempt = n, "attempt came up empty"),
            Err(e) => last_error = Some(e),
        }

        if n < policy.attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.attempts,
        last_error,
    })
}
