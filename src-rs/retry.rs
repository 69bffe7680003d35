use crate::error::{Result, WarehouseError};
use crate::ports::Clock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Runs `attempt` until it yields `Some`, sleeping `policy.delay` between
/// attempts. Errors from `attempt` abort immediately; running out of
/// attempts is a `Timeout` naming `what`.
pub fn retry<U, T, F>(ui: &mut U, policy: RetryPolicy, what: &str, mut attempt: F) -> Result<T>
where
    U: Clock + ?Sized,
    F: FnMut(&mut U, u32) -> Result<Option<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for n in 1..=max_attempts {
        if let Some(value) = attempt(ui, n)? {
            return Ok(value);
        }
        if n < max_attempts {
            ui.sleep(policy.delay, 0.0);
        }
    }
    Err(WarehouseError::Timeout {
        what: what.to_string(),
        attempts: max_attempts,
    })
}
