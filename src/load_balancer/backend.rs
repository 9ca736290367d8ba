//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend address with its pooled transport handle
//! - Carry the decoration its balance policy needs (weight, in-flight counter)
//! - Track in-flight requests through an RAII guard

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::error::{Error, Result};

/// Pooled HTTP client used to reach one backend.
pub type TransportClient = Client<HttpConnector, Body>;

/// Build a connection-pooled transport handle.
pub fn transport_client(pool_max_idle_per_host: usize) -> TransportClient {
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .build(HttpConnector::new())
}

/// What a balance policy attaches to each backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoration {
    /// Selection state lives entirely in the strategy.
    Plain,
    /// Integer weight used by weighted strategies.
    Weighted(u32),
    /// In-flight request counter is the selection input.
    Counted,
}

/// A single backend server.
pub struct Backend {
    /// The address as written in the endpoint record.
    pub addr: String,
    /// Pre-calculated base URL for request forwarding.
    pub base_url: Url,
    pub decoration: Decoration,
    client: TransportClient,
    /// Number of requests currently outstanding.
    in_flight: AtomicUsize,
}

impl Backend {
    /// Create a new backend. Fails when `addr` is not a usable authority.
    pub fn new(addr: impl Into<String>, decoration: Decoration, client: TransportClient) -> Result<Self> {
        let addr = addr.into();
        let raw = if addr.contains("://") {
            addr.clone()
        } else {
            format!("http://{addr}")
        };
        let base_url = Url::parse(&raw)
            .ok()
            .filter(|url| url.host_str().is_some())
            .ok_or_else(|| Error::validation("backend.new", format!("malformed address {addr:?}")))?;
        Ok(Self {
            addr,
            base_url,
            decoration,
            client,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Weight for weighted strategies; undecorated backends count as 1.
    pub fn weight(&self) -> u32 {
        match self.decoration {
            Decoration::Weighted(weight) => weight,
            Decoration::Plain | Decoration::Counted => 1,
        }
    }

    /// Get the current number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Transport handle for forwarding requests to this backend.
    pub fn client(&self) -> &TransportClient {
        &self.client
    }

    /// Mark a request as started; it ends when the guard drops.
    pub fn acquire(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            backend: self.clone(),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("addr", &self.addr)
            .field("decoration", &self.decoration)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A RAII guard that manages the in-flight request count.
#[derive(Debug)]
pub struct InFlightGuard {
    pub backend: Arc<Backend>,
}

impl Deref for InFlightGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.backend.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(crate) fn test_backend(addr: &str, decoration: Decoration) -> Arc<Backend> {
    Arc::new(Backend::new(addr, decoration, transport_client(1)).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_in_flight() {
        let backend = test_backend("127.0.0.1:8080", Decoration::Counted);
        let first = backend.acquire();
        let second = backend.acquire();
        assert_eq!(backend.in_flight(), 2);
        drop(first);
        assert_eq!(second.in_flight(), 1);
        drop(second);
        assert_eq!(backend.in_flight(), 0);
    }

    #[test]
    fn test_base_url() {
        let backend = test_backend("10.0.0.1:9000", Decoration::Plain);
        assert_eq!(backend.base_url.as_str(), "http://10.0.0.1:9000/");
        let backend = test_backend("https://svc.internal", Decoration::Weighted(3));
        assert_eq!(backend.base_url.scheme(), "https");
        assert_eq!(backend.weight(), 3);
    }

    #[test]
    fn test_malformed_address() {
        let err = Backend::new("http://", Decoration::Plain, transport_client(1)).unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Validation(_)));
    }
}
