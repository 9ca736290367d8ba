//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → KvStore → EndpointStore, RouteTable, ServiceRegistry
//!     → Reconciler (resync, then watch) → admin listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → watch loop stops after the current event
//!     → admin server drains → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Subsystems are constructed explicitly and shared via Arc; no globals
//! - The reconciler starts before the admin listener accepts traffic

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::Gateway;
