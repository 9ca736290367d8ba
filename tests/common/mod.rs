//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use endpoint_gateway::config::GatewayConfig;
use endpoint_gateway::descriptor::fixture::ServiceFixture;
use endpoint_gateway::endpoint::{EndpointAddr, NewEndpoint};
use endpoint_gateway::kv::MemoryStore;
use endpoint_gateway::Gateway;

pub const API_KEY: &str = "test-admin-key";

/// Config with fast reconnects and a known admin key.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.store.endpoints_prefix = "/it/endpoints".into();
    config.admin.api_key = API_KEY.into();
    config.watcher.reconnect_base_ms = 20;
    config.watcher.reconnect_max_ms = 200;
    config
}

/// A gateway over a fresh in-memory store. The store handle is returned
/// for outage simulation.
pub fn gateway(config: GatewayConfig) -> (Gateway, Arc<MemoryStore>) {
    gateway_on(config, MemoryStore::new())
}

/// A gateway over a caller-configured store, e.g. one with short history.
pub fn gateway_on(config: GatewayConfig, store: MemoryStore) -> (Gateway, Arc<MemoryStore>) {
    let kv = Arc::new(store);
    (Gateway::build(config, kv.clone()), kv)
}

pub fn echo_fixture() -> ServiceFixture {
    ServiceFixture::new("echo.v1", "Echo")
        .route("Echo", "get", "/api/v1/echo")
        .json_response(true)
}

/// Creation request for the echo service behind `backends`.
pub fn echo_endpoint(balance: &str, backends: &[&str]) -> NewEndpoint {
    NewEndpoint {
        name: "echo".into(),
        service_name: "echo.v1.Echo".into(),
        description: "integration echo".into(),
        tags: ["demo".to_string()].into_iter().collect(),
        balance: balance.into(),
        endpoints: backends.iter().map(|a| EndpointAddr::new(*a, 1)).collect(),
        descriptor_set: echo_fixture().encode(),
    }
}

/// Poll `check` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
