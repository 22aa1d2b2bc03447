//! In-process counter store.
//!
//! Correct for a single instance only; separate processes each get their own
//! quota. Used in tests and for local runs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{Acquisition, CounterStore};
use crate::error::CheckError;
use crate::ratelimit::QuotaPolicy;

/// Admission timestamps for one key, oldest first.
#[derive(Debug)]
struct SlidingLog {
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl SlidingLog {
    fn new(window: Duration) -> Self {
        Self {
            window,
            admitted: VecDeque::new(),
        }
    }

    /// Drop admissions that have left the window ending at `now`.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.admitted
            .back()
            .map_or(true, |&newest| now.saturating_duration_since(newest) >= self.window)
    }
}

/// A sliding-window log per key, held in a sharded map.
///
/// The shard lock taken by `DashMap::entry` makes prune, count and record a
/// single atomic step for each key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: DashMap<String, SlidingLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Remove keys whose newest admission is older than their window.
    ///
    /// Returns how many keys were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, log| !log.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the runtime stops.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    debug!(removed, remaining = self.len(), "Swept expired quota windows");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn acquire(&self, key: &str, policy: &QuotaPolicy) -> Result<Acquisition, CheckError> {
        let now = Instant::now();
        let mut log = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| SlidingLog::new(policy.window()));

        log.window = policy.window();
        log.prune(now);

        let count = log.admitted.len() as u64;
        if count < policy.limit() {
            log.admitted.push_back(now);
            Ok(Acquisition {
                admitted: true,
                count: count + 1,
            })
        } else {
            Ok(Acquisition {
                admitted: false,
                count,
            })
        }
    }
}
