//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Reconciler watch loop:
//!     subscription lost → backoff.rs (exponential delay + jitter) → resubscribe
//! ```
//!
//! # Design Decisions
//! - Store operations are never retried in place; only the subscription reconnects

pub mod backoff;
