//! In-process service registry.
//!
//! # Responsibilities
//! - Hold the load balancer and handler client of each registered service
//! - Select a backend for a service and hand back an in-flight guard
//! - Enumerate backends for the admin API

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::descriptor::ServiceDescription;
use crate::error::{Error, Result};
use crate::gateway::GatewayFacade;
use crate::load_balancer::{Backend, InFlightGuard, LoadBalance};
use crate::observability::metrics::SERVICES;

/// Per-service dispatch metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerClient {
    pub service: String,
    /// gRPC method paths served by the service.
    pub methods: Vec<String>,
    pub use_json_response: bool,
}

/// Manages registered services and their load balancers.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    balancers: DashMap<String, Arc<dyn LoadBalance>>,
    handlers: DashMap<String, HandlerClient>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a backend for the given service.
    /// Returns a guard that decrements the in-flight count on drop.
    pub fn pick(&self, service: &str, client_key: &str) -> Option<InFlightGuard> {
        let Some(lb) = self.balancers.get(service).map(|lb| lb.value().clone()) else {
            tracing::debug!(service = %service, "Service not found in registry");
            return None;
        };
        match lb.select(client_key) {
            Some(backend) => Some(backend.acquire()),
            None => {
                tracing::debug!(service = %service, backend_count = lb.backends().len(), "No selectable backend");
                None
            }
        }
    }

    pub fn load_balancer(&self, service: &str) -> Option<Arc<dyn LoadBalance>> {
        self.balancers.get(service).map(|lb| lb.value().clone())
    }

    pub fn handler_client(&self, service: &str) -> Option<HandlerClient> {
        self.handlers.get(service).map(|h| h.value().clone())
    }

    /// Registered service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.balancers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Return every registered `(service, backend)` pair.
    pub fn all_backends(&self) -> Vec<(String, Arc<Backend>)> {
        self.balancers
            .iter()
            .flat_map(|entry| {
                let service = entry.key().clone();
                entry
                    .value()
                    .backends()
                    .iter()
                    .map(move |b| (service.clone(), b.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl GatewayFacade for ServiceRegistry {
    async fn register_service(
        &self,
        description: &ServiceDescription,
        load_balancer: Arc<dyn LoadBalance>,
    ) -> Result<()> {
        if description.services.is_empty() {
            return Err(Error::validation(
                "gateway.register_service",
                "descriptor declares no services",
            ));
        }
        for service in &description.services {
            self.handlers.insert(
                service.full_name.clone(),
                HandlerClient {
                    service: service.full_name.clone(),
                    methods: service.methods.iter().map(|m| service.grpc_method(m)).collect(),
                    use_json_response: service.use_json_response,
                },
            );
            self.balancers
                .insert(service.full_name.clone(), load_balancer.clone());
            tracing::info!(
                service = %service.full_name,
                balance = %load_balancer.balance(),
                backends = load_balancer.backends().len(),
                "Service registered"
            );
        }
        metrics::gauge!(SERVICES).set(self.balancers.len() as f64);
        Ok(())
    }

    fn delete_load_balance(&self, description: &ServiceDescription) {
        for service in &description.services {
            if self.balancers.remove(&service.full_name).is_some() {
                tracing::info!(service = %service.full_name, "Load balancer removed");
            }
        }
        metrics::gauge!(SERVICES).set(self.balancers.len() as f64);
    }

    async fn delete_handler_client(&self, description: &ServiceDescription) -> Result<()> {
        for service in &description.services {
            self.handlers.remove(&service.full_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MethodDescription, ServiceInfo};
    use crate::endpoint::EndpointAddr;
    use crate::load_balancer::LoadBalancerFactory;

    fn description() -> ServiceDescription {
        ServiceDescription {
            services: vec![ServiceInfo {
                full_name: "echo.v1.Echo".into(),
                auth_required: false,
                use_json_response: true,
                methods: vec![MethodDescription {
                    name: "Echo".into(),
                    input_type: "echo.v1.EchoRequest".into(),
                    output_type: "echo.v1.EchoResponse".into(),
                    http: None,
                }],
            }],
        }
    }

    fn balancer() -> Arc<dyn LoadBalance> {
        LoadBalancerFactory::default()
            .build("rr", &[EndpointAddr::new("127.0.0.1:9000", 1)])
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_pick() {
        let registry = ServiceRegistry::new();
        registry.register_service(&description(), balancer()).await.unwrap();

        let guard = registry.pick("echo.v1.Echo", "10.0.0.1").unwrap();
        assert_eq!(guard.addr, "127.0.0.1:9000");
        assert_eq!(guard.in_flight(), 1);
        drop(guard);

        let handler = registry.handler_client("echo.v1.Echo").unwrap();
        assert_eq!(handler.methods, vec!["/echo.v1.Echo/Echo"]);
        assert!(handler.use_json_response);
        assert_eq!(registry.services(), vec!["echo.v1.Echo"]);
        assert_eq!(registry.all_backends().len(), 1);
    }

    #[tokio::test]
    async fn test_deregister() {
        let registry = ServiceRegistry::new();
        let desc = description();
        registry.register_service(&desc, balancer()).await.unwrap();

        registry.delete_load_balance(&desc);
        registry.delete_handler_client(&desc).await.unwrap();
        assert!(registry.pick("echo.v1.Echo", "").is_none());
        assert!(registry.handler_client("echo.v1.Echo").is_none());

        // Idempotent.
        registry.delete_load_balance(&desc);
        registry.delete_handler_client(&desc).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_requires_services() {
        let registry = ServiceRegistry::new();
        let err = registry
            .register_service(&ServiceDescription::default(), balancer())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Validation(_)));
    }
}
