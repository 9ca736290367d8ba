//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Reconciler (single writer)
//!     → table.rs load_all_routers / delete_routers (one descriptor at a time)
//!
//! Dispatcher / auth middleware (many readers)
//!     → table.rs get_route(path) / get_route_by_grpc_method(method)
//!     → Return: RouteEntry or None
//! ```
//!
//! # Design Decisions
//! - One explicitly constructed table, shared via Arc; never a global
//! - Entries are added and removed per descriptor, never individually
//! - Reads run concurrently; writers are serialized by the Reconciler
//! - Gateway-internal services bypass dynamic routing

pub mod table;

pub use table::{RouteEntry, RouteTable};
