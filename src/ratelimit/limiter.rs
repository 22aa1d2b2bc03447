//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::decision::Decision;
use super::policy::QuotaPolicy;
use crate::error::CheckError;
use crate::store::CounterStore;

/// Default bound on one store round trip.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// The core rate limiter.
///
/// Holds no counters of its own; every check is one atomic operation in the
/// shared store. Cheap to share across tasks behind an `Arc`.
pub struct RateLimiter {
    /// Where admissions are recorded
    store: Arc<dyn CounterStore>,
    /// Limit and window applied to every key
    policy: QuotaPolicy,
    /// Namespace prepended to keys before they reach the store
    prefix: String,
    /// Upper bound on a single store call
    timeout: Duration,
}

impl RateLimiter {
    /// Create a rate limiter over `store` with the given policy.
    pub fn new(store: Arc<dyn CounterStore>, policy: QuotaPolicy) -> Self {
        Self {
            store,
            policy,
            prefix: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Namespace all keys under `prefix` in the store.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Consume one unit of `key`'s quota if any is left.
    ///
    /// The key is opaque. A denial is returned as `Ok` with
    /// `is_allowed() == false`; `Err` means the outcome is unknown.
    ///
    /// Retrying after [`CheckError::StoreUnavailable`] can double count: the
    /// store may have recorded the admission even though the reply was lost.
    pub async fn check(&self, key: &str) -> Result<Decision, CheckError> {
        let store_key = format!("{}{}", self.prefix, key);

        trace!(key = %store_key, limit = self.policy.limit(), "Checking rate limit");

        let acquisition = tokio::time::timeout(self.timeout, self.store.acquire(&store_key, &self.policy))
            .await
            .map_err(|_| {
                CheckError::StoreUnavailable(format!(
                    "counter store did not answer within {:?}",
                    self.timeout
                ))
            })??;

        if acquisition.admitted {
            Ok(Decision::admit(
                self.policy.limit().saturating_sub(acquisition.count),
            ))
        } else {
            debug!(key = %store_key, count = acquisition.count, "Rate limit exceeded");
            Ok(Decision::deny())
        }
    }
}
