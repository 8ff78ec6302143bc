//! Time-boxed read-through cache for post listings and single posts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::model::Post;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub posts: Vec<Post>,
    pub total_count: i64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    page: CachedPage,
    stored_at: DateTime<Utc>,
}

/// Shared behind `Arc`; concurrent writers to one key race and the last write wins.
#[derive(Debug)]
pub struct PostsCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PostsCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entry for `key`; expired entries are dropped on the way out.
    pub fn get(&self, key: &str) -> Option<CachedPage> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        // A clock that went backwards still counts as fresh.
        let fresh = (now - entry.stored_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(true);
        if fresh {
            debug!(key, "posts cache hit");
            Some(entry.page.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn put(&self, key: impl Into<String>, page: CachedPage) {
        let stored_at = self.clock.now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), CacheEntry { page, stored_at });
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
