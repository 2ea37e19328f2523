//! Bounded retry of origin generation.
//!
//! Generation is retried immediately, without backoff: the origin is a local
//! renderer and a failed attempt is usually a transient resource shortage.
//! One policy object is shared by every retry site.

use std::future::Future;

use tracing::debug;

use crate::error::GenerateError;

/// Default maximum number of generation attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` attempts; at least one is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds with a value `accept` approves.
    ///
    /// Transient errors and rejected values trigger another attempt; a
    /// permanent error is returned at once. When attempts run out the last
    /// outcome is returned as is, so an unaccepted value can still be
    /// inspected by the caller.
    pub async fn run_until<T, F, Fut, A>(
        &self,
        label: &str,
        mut op: F,
        accept: A,
    ) -> Result<T, GenerateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerateError>>,
        A: Fn(&T) -> bool,
    {
        let mut attempt = 1;
        loop {
            let outcome = op().await;
            let done = match &outcome {
                Ok(value) => accept(value),
                Err(e) => !e.is_transient(),
            };
            if done || attempt >= self.max_attempts {
                return outcome;
            }
            debug!(label, attempt, "Retrying generation");
            attempt += 1;
        }
    }

    /// Run `op` until it succeeds.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, GenerateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerateError>>,
    {
        self.run_until(label, op, |_| true).await
    }
}
