// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Time-bounded cache of per-mountpoint usage.
//!
//! Classifying storage needs the usage of every mounted filesystem on every
//! node. Fetching it fans out to all node agents, so the merged sample is
//! reused until it is older than the TTL.

use crate::metrics;
use crate::nodeagent::BlockUsage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Mountpoint usage keyed by mountpoint path.
pub type UsageSample = Arc<HashMap<String, BlockUsage>>;

/// Produces a fresh usage sample.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn usage(&self) -> HashMap<String, BlockUsage>;
}

pub struct MountpointCache {
    source: Arc<dyn UsageSource>,
    ttl: Duration,
    sample: Mutex<Option<(Instant, UsageSample)>>,
}

impl MountpointCache {
    #[must_use]
    pub fn new(source: Arc<dyn UsageSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            sample: Mutex::new(None),
        }
    }

    /// Current sample, refreshed when older than the TTL.
    ///
    /// The lock is held across the refresh so concurrent callers that miss
    /// wait for one fetch instead of each fanning out.
    pub async fn get(&self) -> UsageSample {
        let mut sample = self.sample.lock().await;
        if let Some((fetched_at, usage)) = sample.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Arc::clone(usage);
            }
        }

        let usage = Arc::new(self.source.usage().await);
        metrics::record_mountpoint_cache_refresh();
        debug!(mountpoints = usage.len(), "Refreshed mountpoint usage cache");
        *sample = Some((Instant::now(), Arc::clone(&usage)));
        usage
    }

    /// Drop the cached sample so the next read refreshes.
    pub async fn invalidate(&self) {
        *self.sample.lock().await = None;
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
