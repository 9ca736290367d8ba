//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint.balance + Endpoint.endpoints
//!     → factory.rs new_endpoints (one pooled Backend per address, decorated)
//!     → factory.rs new_load_balance (strategy for the balance type):
//!         - round_robin.rs (rotate through backends)
//!         - weighted_round_robin.rs (smooth weighted rotation)
//!         - least_conn.rs (fewest in-flight, optionally per weight)
//!         - sed.rs (shortest expected delay / never queue)
//!         - consistent_hash.rs (client key → hash ring)
//!     → LoadBalance::select(client_key) per request
//! ```
//!
//! # Design Decisions
//! - Strategies own their backend list; a new record builds a new strategy
//! - In-flight counts are tracked by guards on the backend, not the strategy
//! - Zero-weight backends are drained: weighted strategies never pick them

pub mod backend;
pub mod consistent_hash;
pub mod factory;
pub mod least_conn;
pub mod round_robin;
pub mod sed;
pub mod weighted_round_robin;

use std::fmt::Debug;
use std::sync::Arc;

use crate::endpoint::Balance;

pub use backend::{Backend, Decoration, InFlightGuard};
pub use factory::LoadBalancerFactory;

/// A backend selection strategy.
pub trait LoadBalance: Send + Sync + Debug {
    /// Pick a backend for a request. `client_key` identifies the caller
    /// (e.g. client IP); only key-aware strategies look at it.
    fn select(&self, client_key: &str) -> Option<Arc<Backend>>;

    /// Every backend the strategy chooses from.
    fn backends(&self) -> &[Arc<Backend>];

    fn balance(&self) -> Balance;
}
