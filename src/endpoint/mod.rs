//! Endpoint records and their persistence.
//!
//! # Data Flow
//! ```text
//! admin API (AddConfig / Patch / Delete / Get / List)
//!     → store.rs (EndpointStore)
//!         {prefix}/service/{id}      → JSON Endpoint
//!         {prefix}/tags/{tag}/{id}   → detail key
//!     → KvStore change feed → Reconciler
//! ```
//!
//! # Design Decisions
//! - The record is the only source of truth; the tag index only points at it
//! - Detail key is written before index entries and read before they are deleted
//! - Store errors are surfaced unchanged, never retried here

pub mod id;
pub mod model;
pub mod store;

pub use id::SnowflakeGenerator;
pub use model::{Balance, Endpoint, EndpointAddr, NewEndpoint};
pub use store::EndpointStore;
