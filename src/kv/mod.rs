//! Key-value configuration store abstraction.
//!
//! # Data Flow
//! ```text
//! EndpointStore ──put/get/delete──▶ KvStore ──watch(prefix, rev)──▶ Reconciler
//! ```
//!
//! # Design Decisions
//! - Revisions are store-global and strictly increasing, one per mutation
//! - An empty stored value is returned as-is; interpreting it is the caller's job
//! - Delete events carry the value the key held before deletion
//! - Watches resume from an explicit revision so a reconnecting subscriber
//!   never misses an event the store still remembers

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;

pub use memory::MemoryStore;

/// Store-global modification counter.
pub type Revision = i64;

/// A stored key with its value and the revision that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub mod_revision: Revision,
}

/// Kind of change reported by a watch.
///
/// The wire encoding is an integer; values other than PUT and DELETE are
/// preserved so the consumer can reject them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
    Unknown(i32),
}

impl From<i32> for EventType {
    fn from(raw: i32) -> Self {
        match raw {
            0 => EventType::Put,
            1 => EventType::Delete,
            other => EventType::Unknown(other),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Put => write!(f, "PUT"),
            EventType::Delete => write!(f, "DELETE"),
            EventType::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

/// One change delivered by a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub key: String,
    pub value: Vec<u8>,
    pub revision: Revision,
}

/// Ordered change feed. The stream ends when the subscription is lost;
/// consumers reconnect with the last revision they processed + 1.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Operations the control plane needs from the configuration store.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Point read. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<KeyValue>>;

    /// All keys starting with `prefix`, in key order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>>;

    /// Write `value` at `key`, returning the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<Revision>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Subscribe to changes under `prefix`, replaying retained history
    /// starting at `from_revision` (0 means live events only). Fails with
    /// `Compacted` when `from_revision` predates the retained history.
    async fn watch(&self, prefix: &str, from_revision: Revision) -> Result<WatchStream>;

    /// Latest revision written.
    async fn current_revision(&self) -> Result<Revision>;
}
