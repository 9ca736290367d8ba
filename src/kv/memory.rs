//! In-process configuration store.
//!
//! # Responsibilities
//! - Hold keys in order for prefix scans
//! - Assign revisions and retain a bounded event history
//! - Fan events out to live watchers
//! - Simulate outages for failure-path tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::kv::{EventType, KeyValue, KvStore, Revision, WatchEvent, WatchStream};

const DEFAULT_HISTORY: usize = 4096;

struct Subscriber {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

struct Inner {
    data: BTreeMap<String, KeyValue>,
    revision: Revision,
    history: VecDeque<WatchEvent>,
    subscribers: Vec<Subscriber>,
    available: bool,
}

/// A thread-safe in-memory [`KvStore`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
    history_limit: usize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Create an empty store retaining at most `history_limit` events for replay.
    pub fn with_history(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: BTreeMap::new(),
                revision: 0,
                history: VecDeque::new(),
                subscribers: Vec::new(),
                available: true,
            }),
            history_limit,
        }
    }

    /// Toggle availability. Going unavailable drops every live watch so
    /// subscribers observe a disconnect.
    pub fn set_available(&self, available: bool) {
        let mut inner = self.lock();
        inner.available = available;
        if !available {
            inner.subscribers.clear();
        }
    }

    /// Number of live watch subscriptions.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a panicking test thread; the map is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(inner: &Inner, op: &'static str) -> Result<()> {
        if inner.available {
            Ok(())
        } else {
            Err(Error::transient(op, "configuration store unavailable"))
        }
    }

    fn publish(&self, inner: &mut Inner, event: WatchEvent) {
        inner
            .subscribers
            .retain(|s| !event.key.starts_with(&s.prefix) || s.tx.send(event.clone()).is_ok());
        inner.history.push_back(event);
        while inner.history.len() > self.history_limit {
            inner.history.pop_front();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let inner = self.lock();
        Self::check(&inner, "kv.get")?;
        Ok(inner.data.get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let inner = self.lock();
        Self::check(&inner, "kv.get_prefix")?;
        Ok(inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, kv)| kv.clone())
            .collect())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<Revision> {
        let mut inner = self.lock();
        Self::check(&inner, "kv.put")?;
        inner.revision += 1;
        let revision = inner.revision;
        inner.data.insert(
            key.to_string(),
            KeyValue {
                key: key.to_string(),
                value: value.clone(),
                mod_revision: revision,
            },
        );
        self.publish(
            &mut inner,
            WatchEvent {
                event_type: EventType::Put,
                key: key.to_string(),
                value,
                revision,
            },
        );
        Ok(revision)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock();
        Self::check(&inner, "kv.delete")?;
        let Some(previous) = inner.data.remove(key) else {
            return Ok(false);
        };
        inner.revision += 1;
        let revision = inner.revision;
        self.publish(
            &mut inner,
            WatchEvent {
                event_type: EventType::Delete,
                key: key.to_string(),
                value: previous.value,
                revision,
            },
        );
        Ok(true)
    }

    async fn watch(&self, prefix: &str, from_revision: Revision) -> Result<WatchStream> {
        let mut inner = self.lock();
        Self::check(&inner, "kv.watch")?;
        if from_revision > 0 && from_revision <= inner.revision {
            let oldest = inner
                .history
                .front()
                .map_or(inner.revision + 1, |e| e.revision);
            if from_revision < oldest {
                return Err(Error::compacted(
                    "kv.watch",
                    format!("revision {from_revision} is older than retained history (oldest {oldest})"),
                ));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay and registration happen under one lock so no event falls in between.
        if from_revision > 0 {
            for event in inner
                .history
                .iter()
                .filter(|e| e.revision >= from_revision && e.key.starts_with(prefix))
            {
                let _ = tx.send(event.clone());
            }
        }
        inner.subscribers.push(Subscriber {
            prefix: prefix.to_string(),
            tx,
        });

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(events.boxed())
    }

    async fn current_revision(&self) -> Result<Revision> {
        let inner = self.lock();
        Self::check(&inner, "kv.current_revision")?;
        Ok(inner.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_scan_is_bounded() {
        let store = MemoryStore::new();
        store.put("/a/1", b"one".to_vec()).await.unwrap();
        store.put("/a/2", b"two".to_vec()).await.unwrap();
        store.put("/b/1", b"other".to_vec()).await.unwrap();

        let keys: Vec<_> = store
            .get_prefix("/a/")
            .await
            .unwrap()
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec!["/a/1", "/a/2"]);
    }

    #[tokio::test]
    async fn test_watch_replays_from_revision() {
        let store = MemoryStore::new();
        let first = store.put("/a/1", b"v1".to_vec()).await.unwrap();
        store.put("/a/1", b"v2".to_vec()).await.unwrap();
        store.delete("/a/1").await.unwrap();

        let mut events = store.watch("/a/", first + 1).await.unwrap();
        let put = events.next().await.unwrap();
        assert_eq!(put.event_type, EventType::Put);
        assert_eq!(put.value, b"v2");
        let del = events.next().await.unwrap();
        assert_eq!(del.event_type, EventType::Delete);
        // Delete carries the previous value.
        assert_eq!(del.value, b"v2");
    }

    #[tokio::test]
    async fn test_watch_below_retained_history_is_compacted() {
        let store = MemoryStore::with_history(2);
        for i in 0..6 {
            store.put("/a/1", format!("v{i}").into_bytes()).await.unwrap();
        }

        let err = match store.watch("/a/", 2).await {
            Ok(_) => panic!("resume from a dropped revision must fail"),
            Err(e) => e,
        };
        assert!(err.is_compacted());

        // The oldest retained revision still replays.
        let mut events = store.watch("/a/", 5).await.unwrap();
        assert_eq!(events.next().await.unwrap().revision, 5);
        assert!(store.watch("/a/", 7).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_and_ends_watches() {
        let store = MemoryStore::new();
        let mut events = store.watch("/a/", 0).await.unwrap();
        store.set_available(false);

        let err = store.get("/a/1").await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::TransientStore(_)));
        assert!(events.next().await.is_none());

        store.set_available(true);
        assert!(store.get("/a/1").await.unwrap().is_none());
    }

    #[test]
    fn test_event_type_from_wire() {
        assert_eq!(EventType::from(0), EventType::Put);
        assert_eq!(EventType::from(1), EventType::Delete);
        assert_eq!(EventType::from(7), EventType::Unknown(7));
    }
}
