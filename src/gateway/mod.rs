//! Gateway facade: where reconciled services are handed to the data plane.
//!
//! # Data Flow
//! ```text
//! Reconciler
//!     → GatewayFacade::register_service(description, load balancer)
//!     → GatewayFacade::delete_load_balance / delete_handler_client on teardown
//!
//! Dispatcher (out of this crate)
//!     → registry.rs pick(service, client key) → InFlightGuard
//! ```
//!
//! # Design Decisions
//! - The control plane only registers and deregisters; it never forwards requests
//! - Registration is keyed by fully-qualified service name

pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;

use crate::descriptor::ServiceDescription;
use crate::error::Result;
use crate::load_balancer::LoadBalance;

pub use registry::{HandlerClient, ServiceRegistry};

/// Registration surface of the request-forwarding layer.
#[async_trait]
pub trait GatewayFacade: Send + Sync {
    /// Make every service of `description` reachable through `load_balancer`.
    async fn register_service(
        &self,
        description: &ServiceDescription,
        load_balancer: Arc<dyn LoadBalance>,
    ) -> Result<()>;

    /// Forget the load balancers of every service of `description`.
    fn delete_load_balance(&self, description: &ServiceDescription);

    /// Drop the handler clients of every service of `description`.
    async fn delete_handler_client(&self, description: &ServiceDescription) -> Result<()>;
}
