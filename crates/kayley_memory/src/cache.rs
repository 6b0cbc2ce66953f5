//! Explicit read-through/write-through cache for the active thread set.
//!
//! The store stays the source of truth. Every read hands out a snapshot
//! tagged with the cache version; a write must present that version, and a
//! write built from an outdated snapshot is rejected with
//! [`KayleyError::StaleWrite`] instead of overwriting newer data.

use crate::store::CompanionStore;
use kayley_core::{KayleyError, OngoingThread};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Threads as read at one version.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub threads: Vec<OngoingThread>,
    pub version: u64,
}

struct CacheState {
    entry: Option<(Vec<OngoingThread>, Instant)>,
    version: u64,
}

pub struct ThreadCache {
    store: Arc<dyn CompanionStore>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ThreadCache {
    pub fn new(store: Arc<dyn CompanionStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: Mutex::new(CacheState {
                entry: None,
                version: 0,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn CompanionStore> {
        &self.store
    }

    /// Return cached threads, loading from the store when empty or expired.
    pub async fn read(&self) -> Result<ThreadSnapshot, KayleyError> {
        let mut state = self.state.lock().await;
        if let Some((threads, loaded_at)) = &state.entry {
            if loaded_at.elapsed() < self.ttl {
                return Ok(ThreadSnapshot {
                    threads: threads.clone(),
                    version: state.version,
                });
            }
        }

        let threads = self
            .store
            .load_threads()
            .await
            .map_err(|e| KayleyError::Store(format!("{:#}", e)))?;
        tracing::debug!("Thread cache miss, loaded {} threads", threads.len());
        state.entry = Some((threads.clone(), Instant::now()));
        Ok(ThreadSnapshot {
            threads,
            version: state.version,
        })
    }

    /// Persist `threads` and refresh the cache. Returns the new version.
    pub async fn write(&self, read_version: u64, threads: Vec<OngoingThread>) -> Result<u64, KayleyError> {
        let mut state = self.state.lock().await;
        if read_version != state.version {
            tracing::warn!(
                "Rejecting stale thread write (read v{}, current v{})",
                read_version,
                state.version
            );
            return Err(KayleyError::StaleWrite {
                entity: "threads",
                read_version,
                current_version: state.version,
            });
        }

        self.store
            .save_threads(&threads)
            .await
            .map_err(|e| KayleyError::Store(format!("{:#}", e)))?;
        state.version += 1;
        state.entry = Some((threads, Instant::now()));
        Ok(state.version)
    }

    /// Drop the cached entry. Snapshots taken before this call become stale.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.entry = None;
        state.version += 1;
    }

    pub async fn version(&self) -> u64 {
        self.state.lock().await.version
    }
}
