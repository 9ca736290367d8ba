//! Admin API: the management surface over the endpoint store.
//!
//! # Data Flow
//! ```text
//! gatewayctl / operator
//!     → auth.rs (bearer key)
//!     → handlers.rs
//!         /endpoints …     → EndpointStore (writes reach the gateway via the change feed)
//!         /routes, /status → RouteTable / ServiceRegistry snapshots
//!         /resync          → Reconciler::resync
//!     → error.rs (ErrorKind → HTTP status)
//! ```
//!
//! # Design Decisions
//! - Handlers never touch the route table directly; the reconciler is the only writer
//! - No read-your-write guarantee: a write returns before it is reconciled

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::blob::BlobStore;
use crate::endpoint::EndpointStore;
use crate::gateway::ServiceRegistry;
use crate::reconciler::Reconciler;
use crate::routing::RouteTable;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared handles injected into admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub store: EndpointStore,
    pub routes: Arc<RouteTable>,
    pub registry: Arc<ServiceRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub blobs: Option<Arc<dyn BlobStore>>,
    pub api_key: Arc<str>,
}

/// Build the admin router with auth, timeout and trace layers.
#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/endpoints", get(list_endpoints).post(add_endpoint))
        .route(
            "/endpoints/{id}",
            get(get_endpoint).patch(patch_endpoint).delete(delete_endpoint),
        )
        .route("/endpoints/{id}/tags", put(put_tags))
        .route("/routes", get(get_routes))
        .route("/backends", get(get_backends))
        .route("/resync", post(resync))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
