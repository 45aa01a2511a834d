//! In-process coordinator with the same semantics as the Redis one.
//! Only safe across tasks of a single process.

use crate::channels::{dedup_key, lock_key};
use crate::locks::Coordinator;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexer_core::Result;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Slot {
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(ttl_secs: Option<u64>) -> Self {
        Self {
            expires_at: ttl_secs.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCoordinator {
    slots: DashMap<String, Slot>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_if_absent(&self, key: String, ttl_secs: Option<u64>) -> bool {
        let now = Instant::now();
        match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(Slot::new(ttl_secs));
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(ttl_secs));
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn acquire(&self, name: &str, ttl_secs: Option<u64>) -> Result<bool> {
        Ok(self.set_if_absent(lock_key(name), ttl_secs))
    }

    async fn extend(&self, name: &str, ttl_secs: u64) -> Result<bool> {
        let now = Instant::now();
        match self.slots.get_mut(&lock_key(name)) {
            Some(mut slot) if slot.is_live(now) => {
                *slot = Slot::new(Some(ttl_secs));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, name: &str) -> Result<()> {
        self.slots.remove(&lock_key(name));
        Ok(())
    }

    async fn mark_if_new_event(&self, event_hash: &str, ttl_secs: u64) -> Result<bool> {
        Ok(self.set_if_absent(dedup_key(event_hash), Some(ttl_secs)))
    }
}
