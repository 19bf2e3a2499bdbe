//! Endpoint rotation and retry
//!
//! The pool holds one [`ChainRpc`] per configured endpoint and an index to
//! the one currently in use. Rotation is best-effort: concurrent callers may
//! each advance the index, which only changes which endpoint the next call
//! starts on.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::{ChainRpc, Result, SettlementError};

/// Bounded retry for rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff × n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, for tests and mock mode
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Ordered endpoints with a rotating cursor
pub struct EndpointPool {
    backends: Vec<Arc<dyn ChainRpc>>,
    current: AtomicUsize,
}

impl EndpointPool {
    pub fn new(backends: Vec<Arc<dyn ChainRpc>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(SettlementError::RpcError("no RPC endpoints configured".to_string()));
        }
        Ok(Self {
            backends,
            current: AtomicUsize::new(0),
        })
    }

    /// Pool over backends the caller knows to be non-empty
    pub(crate) fn from_non_empty(backends: Vec<Arc<dyn ChainRpc>>) -> Self {
        debug_assert!(!backends.is_empty());
        Self {
            backends,
            current: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Relaxed) % self.backends.len()
    }

    /// Endpoint calls should go to right now
    pub fn current(&self) -> Arc<dyn ChainRpc> {
        Arc::clone(&self.backends[self.current_index()])
    }

    /// Advance to the next endpoint, wrapping around. Returns the new index.
    pub fn rotate(&self) -> usize {
        let len = self.backends.len();
        let previous = self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len))
            .unwrap_or(0);
        (previous + 1) % len
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.endpoint().to_string()).collect()
    }

    /// Run `op` against the current endpoint.
    ///
    /// A [`SettlementError::RateLimited`] result rotates to the next endpoint
    /// and retries after `policy.backoff × attempt`, at most
    /// `policy.max_retries` times. Every other error is returned as is.
    pub async fn with_retry<T, F, Fut>(&self, policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn ChainRpc>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let backend = self.current();
            match op(backend.clone()).await {
                Err(SettlementError::RateLimited(reason)) if attempt < policy.max_retries => {
                    attempt += 1;
                    let next = self.rotate();
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "{} rate limited at {} ({}); retry {}/{} on {} in {:?}",
                        operation,
                        backend.endpoint(),
                        reason,
                        attempt,
                        policy.max_retries,
                        self.backends[next].endpoint(),
                        delay,
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                other => return other,
            }
        }
    }
}
