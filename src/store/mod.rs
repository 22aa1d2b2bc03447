//! Shared counter store abstraction.
//!
//! The limiter holds no counter state itself. Every admission decision is a
//! single atomic operation inside a [`CounterStore`], which is the only
//! synchronization point between concurrent requests and between processes.

mod memory;
mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{CheckError, Result, TollgateError};
use crate::ratelimit::QuotaPolicy;

/// Outcome of one atomic check-and-record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    /// Whether an admission was recorded.
    pub admitted: bool,
    /// Admissions counted in the current window after this call.
    pub count: u64,
}

/// Trait for counter store implementations.
///
/// `acquire` must be atomic per key: two concurrent callers that both see
/// `limit - 1` prior admissions must not both be admitted. Implementations
/// expire state on their own; callers never delete keys.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record one admission for `key` if fewer than `policy.limit()` were
    /// recorded within the trailing `policy.window()`.
    async fn acquire(&self, key: &str, policy: &QuotaPolicy)
        -> std::result::Result<Acquisition, CheckError>;
}

/// Build the store selected by `config`.
///
/// For the memory backend this also starts the background expiry sweep.
pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            store.clone().spawn_sweeper(config.sweep_interval());
            info!("Using in-memory counter store");
            Ok(store)
        }
        StoreBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                TollgateError::Config("store.redis_url is required for the redis backend".into())
            })?;
            let store = RedisStore::connect(url, config.timeout()).await?;
            info!("Using redis counter store");
            Ok(Arc::new(store))
        }
    }
}
