//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct every subsystem from config in dependency order
//! - Start the reconciler before the admin listener
//! - Wait for shutdown and let both drain

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::blob::{BlobStore, FsBlobStore};
use crate::config::GatewayConfig;
use crate::descriptor::DescriptorLoader;
use crate::endpoint::EndpointStore;
use crate::gateway::ServiceRegistry;
use crate::kv::KvStore;
use crate::lifecycle::Shutdown;
use crate::load_balancer::LoadBalancerFactory;
use crate::reconciler::Reconciler;
use crate::routing::RouteTable;

/// The assembled control plane.
pub struct Gateway {
    pub config: GatewayConfig,
    pub store: EndpointStore,
    pub routes: Arc<RouteTable>,
    pub registry: Arc<ServiceRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub blobs: Option<Arc<dyn BlobStore>>,
}

impl Gateway {
    /// Wire subsystems over `kv`. Nothing is started.
    pub fn build(config: GatewayConfig, kv: Arc<dyn KvStore>) -> Self {
        let store = EndpointStore::new(kv, config.store.endpoints_prefix.clone());
        let routes = Arc::new(RouteTable::new(config.routing.local_services.iter()));
        let registry = Arc::new(ServiceRegistry::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            routes.clone(),
            registry.clone(),
            DescriptorLoader::new(config.descriptor.cache_dir.as_ref().map(PathBuf::from)),
            LoadBalancerFactory::new(config.load_balancer.clone()),
            config.watcher.clone(),
        ));
        let blobs = config
            .store
            .blob_dir
            .as_ref()
            .map(|dir| Arc::new(FsBlobStore::new(dir)) as Arc<dyn BlobStore>);

        Self {
            config,
            store,
            routes,
            registry,
            reconciler,
            blobs,
        }
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState {
            store: self.store.clone(),
            routes: self.routes.clone(),
            registry: self.registry.clone(),
            reconciler: self.reconciler.clone(),
            blobs: self.blobs.clone(),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
        }
    }

    /// Run the reconciler and serve the admin API on `listener` until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let reconciler = tokio::spawn(self.reconciler.clone().run(shutdown.subscribe()));

        let router = setup_admin_router(
            self.admin_state(),
            Duration::from_secs(self.config.admin.request_timeout_secs),
        );
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        if let Err(e) = reconciler.await {
            tracing::error!(error = %e, "Reconciler task failed");
        }
        tracing::info!("Gateway stopped");
        Ok(())
    }
}
