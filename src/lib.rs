//! Control plane of a runtime-reconfigurable API gateway.
//!
//! Endpoint records live in a key-value configuration store. The
//! [`reconciler::Reconciler`] follows the store's change feed and, for each
//! record, loads its protobuf descriptor set, rebuilds its load balancer,
//! and updates the [`routing::RouteTable`] and the gateway's service
//! registry. The admin API and `gatewayctl` manage the records.

pub mod admin;
pub mod blob;
pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod kv;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod reconciler;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::{Gateway, Shutdown};
