//! Bounded session storage.
//!
//! Each session owns one immutable [`Corpus`]. The store interface is
//! explicit (`get` / `put` / `evict`) and the in-memory implementation
//! is bounded both in entry count and entry age, so a long-running
//! server cannot leak corpora: the oldest session is evicted when the
//! store is full, and expired sessions are dropped on access.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::Corpus;

/// Abstract session storage.
///
/// Implementations must be `Send + Sync`; corpora are handed out as
/// `Arc` clones because they are immutable after ingestion.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session's corpus. `None` when absent or expired.
    async fn get(&self, id: &str) -> Option<Arc<Corpus>>;

    /// Store a corpus under a session id, replacing any previous one.
    async fn put(&self, id: &str, corpus: Corpus);

    /// Remove a session. Returns whether it existed.
    async fn evict(&self, id: &str) -> bool;
}

struct Entry {
    corpus: Arc<Corpus>,
    stored_at: DateTime<Utc>,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Insertion order, oldest first. Drives capacity eviction.
    order: VecDeque<String>,
}

/// In-memory [`SessionStore`] with a capacity cap and a TTL.
pub struct BoundedSessionStore {
    max_sessions: usize,
    ttl: Duration,
    inner: RwLock<Inner>,
}

impl BoundedSessionStore {
    /// Create a store holding at most `max_sessions` corpora, each
    /// expiring `ttl_secs` seconds after insertion.
    pub fn new(max_sessions: usize, ttl_secs: u64) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
            ttl: Duration::seconds(ttl_secs as i64),
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn is_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now - entry.stored_at >= self.ttl
    }

    /// Number of live (possibly expired, not yet collected) sessions.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for BoundedSessionStore {
    async fn get(&self, id: &str) -> Option<Arc<Corpus>> {
        let now = Utc::now();
        {
            let inner = self.inner.read().unwrap();
            match inner.entries.get(id) {
                Some(entry) if !self.is_expired(entry, now) => {
                    return Some(entry.corpus.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it under the write lock.
        let mut inner = self.inner.write().unwrap();
        inner.entries.remove(id);
        inner.order.retain(|k| k != id);
        None
    }

    async fn put(&self, id: &str, corpus: Corpus) {
        let now = Utc::now();
        let mut inner = self.inner.write().unwrap();

        // Collect expired entries first so they do not count against
        // capacity.
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| self.is_expired(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
        }

        if inner.entries.contains_key(id) {
            inner.order.retain(|k| k != id);
        }
        while inner.entries.len() >= self.max_sessions {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.entries.insert(
            id.to_string(),
            Entry {
                corpus: Arc::new(corpus),
                stored_at: now,
            },
        );
        inner.order.push_back(id.to_string());
    }

    async fn evict(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        inner.order.retain(|k| k != id);
        inner.entries.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddingOrigin, SourceDocument};

    fn corpus(text: &str) -> Corpus {
        Corpus::new(
            SourceDocument::new(None, text.to_string()),
            vec![],
            vec![],
            EmbeddingOrigin::Fallback,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let store = BoundedSessionStore::new(4, 3600);
        store.put("s1", corpus("alpha")).await;
        let got = store.get("s1").await.unwrap();
        assert_eq!(got.document.text, "alpha");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = BoundedSessionStore::new(4, 3600);
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let store = BoundedSessionStore::new(2, 3600);
        store.put("s1", corpus("one")).await;
        store.put("s2", corpus("two")).await;
        store.put("s3", corpus("three")).await;
        assert!(store.get("s1").await.is_none(), "oldest should be evicted");
        assert!(store.get("s2").await.is_some());
        assert!(store.get("s3").await.is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_does_not_double_count() {
        let store = BoundedSessionStore::new(2, 3600);
        store.put("s1", corpus("one")).await;
        store.put("s1", corpus("one again")).await;
        store.put("s2", corpus("two")).await;
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("s1").await.unwrap().document.text, "one again");
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = BoundedSessionStore::new(4, 0);
        store.put("s1", corpus("gone")).await;
        assert!(store.get("s1").await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_evict_removes_session() {
        let store = BoundedSessionStore::new(4, 3600);
        store.put("s1", corpus("one")).await;
        assert!(store.evict("s1").await);
        assert!(!store.evict("s1").await);
        assert!(store.get("s1").await.is_none());
    }
}
