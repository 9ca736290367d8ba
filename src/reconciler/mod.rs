//! Reconciler: turns the configuration change feed into live gateway state.
//!
//! # Data Flow
//! ```text
//! EndpointStore::watch(from_revision)
//!     → handle(event type, key, value)   (one transition at a time)
//!         PUT:    decode → DescriptorLoader → tear down previous registration
//!                 → LoadBalancerFactory → RouteTable::load_all_routers
//!                 → GatewayFacade::register_service
//!         DELETE: decode (or fall back to the remembered description)
//!                 → RouteTable::delete_routers → GatewayFacade teardown
//!     → next_revision = event.revision + 1
//! ```
//!
//! # Design Decisions
//! - A single async mutex serializes transitions; readers of the route table
//!   and registry are never blocked by it
//! - Teardown of the previous registration happens before the new load
//!   balancer is built, so a bad PUT leaves the key deregistered
//! - Descriptions are remembered per key so DELETE works without a value
//! - A service is owned by one key at a time; a PUT claiming a service that
//!   another key registered is rejected with `Conflict`
//! - A lost subscription resumes from the last applied revision + 1, or
//!   resyncs when that revision has been compacted away

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{broadcast, Mutex};

use crate::config::WatcherConfig;
use crate::descriptor::{DescriptorLoader, ServiceDescription};
use crate::endpoint::{Endpoint, EndpointStore};
use crate::error::{Error, Result};
use crate::gateway::GatewayFacade;
use crate::kv::{EventType, Revision, WatchStream};
use crate::load_balancer::LoadBalancerFactory;
use crate::observability::metrics::RECONCILE_TOTAL;
use crate::resilience::backoff::calculate_backoff;
use crate::routing::RouteTable;

/// Outcome of one applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Endpoint registered with this many routes.
    Registered { routes: usize },
    /// Endpoint deregistered; this many routes removed.
    Deregistered { routes: usize },
    /// DELETE for a key that was never registered.
    Noop,
}

/// Applies endpoint changes to the route table and the gateway facade.
pub struct Reconciler {
    store: EndpointStore,
    routes: Arc<RouteTable>,
    facade: Arc<dyn GatewayFacade>,
    loader: DescriptorLoader,
    factory: LoadBalancerFactory,
    config: WatcherConfig,
    /// Description registered for each detail key. Also the transition lock.
    registered: Mutex<HashMap<String, ServiceDescription>>,
}

impl Reconciler {
    pub fn new(
        store: EndpointStore,
        routes: Arc<RouteTable>,
        facade: Arc<dyn GatewayFacade>,
        loader: DescriptorLoader,
        factory: LoadBalancerFactory,
        config: WatcherConfig,
    ) -> Self {
        Self {
            store,
            routes,
            facade,
            loader,
            factory,
            config,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// Apply one change event. Transitions never interleave.
    pub async fn handle(&self, event_type: EventType, key: &str, value: &[u8]) -> Result<Transition> {
        let mut registered = self.registered.lock().await;
        let result = match event_type {
            EventType::Put => self.apply_put(&mut registered, key, value).await,
            EventType::Delete => self.apply_delete(&mut registered, key, value).await,
            EventType::Unknown(raw) => Err(Error::unknown_operation(
                "reconciler.handle",
                format!("event type {raw} for {key}"),
            )),
        };
        drop(registered);

        let op = match event_type {
            EventType::Put => "put",
            EventType::Delete => "delete",
            EventType::Unknown(_) => "unknown",
        };
        match &result {
            Ok(transition) => {
                metrics::counter!(RECONCILE_TOTAL, "op" => op, "result" => "ok").increment(1);
                tracing::info!(key = %key, event = %event_type, transition = ?transition, "Event applied");
            }
            Err(e) => {
                metrics::counter!(RECONCILE_TOTAL, "op" => op, "result" => "error").increment(1);
                tracing::warn!(key = %key, event = %event_type, error = %e, "Event rejected");
            }
        }
        result
    }

    async fn apply_put(
        &self,
        registered: &mut HashMap<String, ServiceDescription>,
        key: &str,
        value: &[u8],
    ) -> Result<Transition> {
        const OP: &str = "reconciler.put";
        let endpoint = decode_endpoint(OP, key, value)?;
        let description = self.describe(&endpoint).await.map_err(|e| e.within(OP))?;

        if let Some((owner, service)) = claimed_elsewhere(registered, key, &description) {
            return Err(Error::conflict(
                OP,
                format!("service {service} is already registered by {owner}"),
            ));
        }

        if let Some(previous) = registered.remove(key) {
            self.deregister(&previous).await.map_err(|e| e.within(OP))?;
        }

        let load_balancer = self
            .factory
            .build(&endpoint.balance, &endpoint.endpoints)
            .map_err(|e| e.within(OP))?;

        let routes = self.routes.load_all_routers(&description);
        registered.insert(key.to_string(), description.clone());
        self.facade
            .register_service(&description, load_balancer)
            .await
            .map_err(|e| e.within(OP))?;
        Ok(Transition::Registered { routes })
    }

    async fn apply_delete(
        &self,
        registered: &mut HashMap<String, ServiceDescription>,
        key: &str,
        value: &[u8],
    ) -> Result<Transition> {
        const OP: &str = "reconciler.delete";
        let previous = registered.remove(key);

        let from_value = if value.is_empty() {
            None
        } else {
            let decoded = match decode_endpoint(OP, key, value) {
                Ok(endpoint) => self.describe(&endpoint).await.map_err(|e| e.within(OP)),
                Err(e) => Err(e),
            };
            match decoded {
                Ok(description) => Some(description),
                Err(e) if previous.is_some() => {
                    tracing::warn!(key = %key, error = %e, "Undecodable delete value, using registered description");
                    None
                }
                Err(e) => return Err(e),
            }
        };
        // The value may describe services this key never owned.
        let from_value = from_value.filter(|description| {
            match claimed_elsewhere(&*registered, key, description) {
                Some((owner, service)) => {
                    tracing::debug!(key = %key, owner, service, "Delete value names a service owned elsewhere");
                    false
                }
                None => true,
            }
        });

        let mut removed = 0;
        let mut torn_down = false;
        for description in from_value.iter().chain(previous.iter()) {
            if torn_down && Some(description) == from_value.as_ref() {
                continue;
            }
            removed += self.deregister(description).await.map_err(|e| e.within(OP))?;
            torn_down = true;
        }

        if torn_down {
            Ok(Transition::Deregistered { routes: removed })
        } else {
            Ok(Transition::Noop)
        }
    }

    async fn describe(&self, endpoint: &Endpoint) -> Result<ServiceDescription> {
        let loader = self.loader.clone();
        let raw = endpoint.descriptor_set.clone();
        tokio::task::spawn_blocking(move || loader.load(&raw))
            .await
            .map_err(|e| Error::schema("descriptor.load", format!("loader task failed: {e}")))?
    }

    async fn deregister(&self, description: &ServiceDescription) -> Result<usize> {
        let removed = self.routes.delete_routers(description);
        self.facade.delete_load_balance(description);
        self.facade.delete_handler_client(description).await?;
        Ok(removed)
    }

    /// Re-apply every stored record and drop registrations whose record is
    /// gone. Returns the store revision observed before listing.
    pub async fn resync(&self) -> Result<Revision> {
        const OP: &str = "reconciler.resync";
        let revision = self.store.current_revision().await.map_err(|e| e.within(OP))?;
        let endpoints = self.store.list_all().await.map_err(|e| e.within(OP))?;

        let mut live = Vec::with_capacity(endpoints.len());
        let mut failed = 0usize;
        for endpoint in &endpoints {
            let key = self.store.detail_key(&endpoint.key);
            let value = serde_json::to_vec(endpoint)
                .map_err(|e| Error::schema(OP, format!("encode {key}: {e}")))?;
            if self.handle(EventType::Put, &key, &value).await.is_err() {
                failed += 1;
            }
            live.push(key);
        }

        let stale: Vec<String> = {
            let registered = self.registered.lock().await;
            registered
                .keys()
                .filter(|key| !live.contains(key))
                .cloned()
                .collect()
        };
        for key in &stale {
            if let Err(e) = self.handle(EventType::Delete, key, &[]).await {
                tracing::warn!(key = %key, error = %e, "Failed to drop stale registration");
            }
        }

        tracing::info!(
            revision,
            endpoints = endpoints.len(),
            failed,
            removed = stale.len(),
            "Resync complete"
        );
        Ok(revision)
    }

    /// Detail keys currently registered.
    pub async fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registered.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Watch loop. Runs until `shutdown` fires; an event already being
    /// applied is finished first.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut next_revision: Revision = 0;
        let mut pending_resync = self.config.resync_on_start;
        let mut attempt: u32 = 0;

        loop {
            match self.subscribe(&mut next_revision, &mut pending_resync).await {
                Ok(mut events) => {
                    tracing::info!(from_revision = next_revision, "Watching endpoint changes");
                    attempt = 0;
                    loop {
                        tokio::select! {
                            event = events.next() => match event {
                                Some(event) => {
                                    // Failures are logged by handle; the feed moves on.
                                    let _ = self.handle(event.event_type, &event.key, &event.value).await;
                                    next_revision = event.revision + 1;
                                }
                                None => {
                                    tracing::warn!(next_revision, "Watch stream ended");
                                    break;
                                }
                            },
                            _ = shutdown.recv() => {
                                tracing::info!("Reconciler stopped");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Watch subscription failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = calculate_backoff(
                attempt,
                self.config.reconnect_base_ms,
                self.config.reconnect_max_ms,
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Reconciler stopped");
    }

    /// Open the change feed. The first successful call pins the starting
    /// revision, after a resync when one is pending. A compacted resume point
    /// schedules a resync for the next attempt.
    async fn subscribe(
        &self,
        next_revision: &mut Revision,
        pending_resync: &mut bool,
    ) -> Result<WatchStream> {
        if *pending_resync {
            *next_revision = self.resync().await? + 1;
            *pending_resync = false;
        } else if *next_revision == 0 {
            *next_revision = self.store.current_revision().await? + 1;
        }
        self.store.watch(*next_revision).await.inspect_err(|e| {
            if e.is_compacted() {
                // Events were lost; only a full resync restores the state.
                *pending_resync = true;
            }
        })
    }
}

/// The first other key whose registration includes a service of `description`.
fn claimed_elsewhere<'a>(
    registered: &'a HashMap<String, ServiceDescription>,
    key: &str,
    description: &ServiceDescription,
) -> Option<(&'a str, &'a str)> {
    registered
        .iter()
        .filter(|(owner, _)| owner.as_str() != key)
        .find_map(|(owner, other)| {
            other
                .services
                .iter()
                .find(|s| description.services.iter().any(|d| d.full_name == s.full_name))
                .map(|s| (owner.as_str(), s.full_name.as_str()))
        })
}

fn decode_endpoint(op: &'static str, key: &str, value: &[u8]) -> Result<Endpoint> {
    serde_json::from_slice(value).map_err(|e| Error::schema(op, format!("decode {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::fixture::ServiceFixture;
    use crate::endpoint::{EndpointAddr, NewEndpoint};
    use crate::error::ErrorKind;
    use crate::gateway::ServiceRegistry;
    use crate::kv::{KvStore, MemoryStore};

    struct Harness {
        store: EndpointStore,
        routes: Arc<RouteTable>,
        registry: Arc<ServiceRegistry>,
        reconciler: Reconciler,
    }

    fn harness() -> Harness {
        harness_on(Arc::new(MemoryStore::new()))
    }

    fn harness_on(kv: Arc<MemoryStore>) -> Harness {
        let store = EndpointStore::new(kv, "/test");
        let routes = Arc::new(RouteTable::default());
        let registry = Arc::new(ServiceRegistry::new());
        let reconciler = Reconciler::new(
            store.clone(),
            routes.clone(),
            registry.clone(),
            DescriptorLoader::default(),
            LoadBalancerFactory::default(),
            WatcherConfig::default(),
        );
        Harness { store, routes, registry, reconciler }
    }

    fn echo_record(key: &str, balance: &str) -> Endpoint {
        new_echo(balance).into_endpoint(key.into(), chrono::Utc::now())
    }

    fn new_echo(balance: &str) -> NewEndpoint {
        NewEndpoint {
            name: "echo".into(),
            service_name: "echo.v1.Echo".into(),
            description: String::new(),
            tags: Default::default(),
            balance: balance.into(),
            endpoints: vec![EndpointAddr::new("127.0.0.1:9000", 1)],
            descriptor_set: ServiceFixture::new("echo.v1", "Echo")
                .route("Echo", "get", "/api/v1/echo")
                .encode(),
        }
    }

    fn shared_path_record(key: &str, package: &str, service: &str) -> Vec<u8> {
        let mut record = echo_record(key, "rr");
        record.descriptor_set = ServiceFixture::new(package, service)
            .route("Call", "post", "/shared")
            .encode();
        serde_json::to_vec(&record).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_delete() {
        let h = harness();
        let record = echo_record("1", "rr");
        let value = serde_json::to_vec(&record).unwrap();

        let t = h.reconciler.handle(EventType::Put, "/test/service/1", &value).await.unwrap();
        assert_eq!(t, Transition::Registered { routes: 1 });
        let route = h.routes.get_route("/api/v1/echo").unwrap();
        assert_eq!(route.service_full_name, "echo.v1.Echo");
        assert_eq!(route.method_name, "Echo");
        assert!(h.registry.pick("echo.v1.Echo", "").is_some());

        let t = h.reconciler.handle(EventType::Delete, "/test/service/1", &value).await.unwrap();
        assert_eq!(t, Transition::Deregistered { routes: 1 });
        assert!(h.routes.get_route("/api/v1/echo").is_none());
        assert!(h.registry.pick("echo.v1.Echo", "").is_none());
    }

    #[tokio::test]
    async fn test_repeated_put_is_idempotent() {
        let h = harness();
        let value = serde_json::to_vec(&echo_record("1", "wrr")).unwrap();
        for _ in 0..3 {
            h.reconciler.handle(EventType::Put, "/test/service/1", &value).await.unwrap();
        }
        assert_eq!(h.routes.len(), 1);
        assert_eq!(h.registry.services(), vec!["echo.v1.Echo"]);
    }

    #[tokio::test]
    async fn test_malformed_value_leaves_state() {
        let h = harness();
        let value = serde_json::to_vec(&echo_record("1", "rr")).unwrap();
        h.reconciler.handle(EventType::Put, "/test/service/1", &value).await.unwrap();

        let err = h
            .reconciler
            .handle(EventType::Put, "/test/service/1", b"{not json")
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Schema(_)));
        assert!(h.routes.get_route("/api/v1/echo").is_some());
    }

    #[tokio::test]
    async fn test_unknown_event_type() {
        let h = harness();
        let err = h
            .reconciler
            .handle(EventType::Unknown(7), "/test/service/1", b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownOperation(_)));
        assert!(h.routes.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_balance_tears_down_previous() {
        let h = harness();
        let good = serde_json::to_vec(&echo_record("1", "rr")).unwrap();
        h.reconciler.handle(EventType::Put, "/test/service/1", &good).await.unwrap();

        let bad = serde_json::to_vec(&echo_record("1", "random")).unwrap();
        let err = h
            .reconciler
            .handle(EventType::Put, "/test/service/1", &bad)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
        assert!(h.routes.get_route("/api/v1/echo").is_none());
        assert!(h.registry.pick("echo.v1.Echo", "").is_none());
    }

    #[tokio::test]
    async fn test_delete_without_value_uses_registered_description() {
        let h = harness();
        let value = serde_json::to_vec(&echo_record("1", "rr")).unwrap();
        h.reconciler.handle(EventType::Put, "/test/service/1", &value).await.unwrap();

        let t = h.reconciler.handle(EventType::Delete, "/test/service/1", &[]).await.unwrap();
        assert_eq!(t, Transition::Deregistered { routes: 1 });
        assert!(h.routes.is_empty());

        let t = h.reconciler.handle(EventType::Delete, "/test/service/1", &[]).await.unwrap();
        assert_eq!(t, Transition::Noop);
    }

    #[tokio::test]
    async fn test_resync_drops_stale_registrations() {
        let h = harness();
        let stored = h.store.add_config(new_echo("lc")).await.unwrap();

        let orphan = ServiceFixture::new("orphan.v1", "Orphan").route("Ping", "post", "/orphan");
        let mut record = echo_record("99", "rr");
        record.descriptor_set = orphan.encode();
        let value = serde_json::to_vec(&record).unwrap();
        h.reconciler.handle(EventType::Put, "/test/service/99", &value).await.unwrap();

        h.reconciler.resync().await.unwrap();
        assert_eq!(
            h.reconciler.registered_keys().await,
            vec![h.store.detail_key(&stored.key)]
        );
        assert!(h.routes.get_route("/orphan").is_none());
        assert!(h.routes.get_route("/api/v1/echo").is_some());
    }

    #[tokio::test]
    async fn test_second_key_cannot_claim_a_registered_service() {
        let h = harness();
        let first = serde_json::to_vec(&echo_record("1", "rr")).unwrap();
        let second = serde_json::to_vec(&echo_record("2", "rr")).unwrap();
        h.reconciler.handle(EventType::Put, "/test/service/1", &first).await.unwrap();

        let err = h
            .reconciler
            .handle(EventType::Put, "/test/service/2", &second)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Conflict(_)));

        // Deleting the rejected key must not touch the owner's state.
        let t = h.reconciler.handle(EventType::Delete, "/test/service/2", &second).await.unwrap();
        assert_eq!(t, Transition::Noop);
        assert!(h.routes.get_route("/api/v1/echo").is_some());
        assert!(h.routes.get_route_by_grpc_method("/echo.v1.Echo/Echo").is_some());
        assert!(h.registry.pick("echo.v1.Echo", "").is_some());
        assert_eq!(h.reconciler.registered_keys().await, vec!["/test/service/1"]);

        // Once the owner is gone the service is free again.
        h.reconciler.handle(EventType::Delete, "/test/service/1", &[]).await.unwrap();
        let t = h.reconciler.handle(EventType::Put, "/test/service/2", &second).await.unwrap();
        assert_eq!(t, Transition::Registered { routes: 1 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_keep_routes_and_registry_in_step() {
        let h = harness();
        let reconciler = Arc::new(h.reconciler);
        let records = [
            ("/test/service/1", shared_path_record("1", "alpha.v1", "Alpha")),
            ("/test/service/2", shared_path_record("2", "beta.v1", "Beta")),
        ];

        let mut tasks = Vec::new();
        for round in 0..30 {
            for (key, value) in &records {
                let reconciler = reconciler.clone();
                let key = key.to_string();
                let value = value.clone();
                let event_type = if round % 3 == 2 { EventType::Delete } else { EventType::Put };
                tasks.push(tokio::spawn(async move {
                    reconciler.handle(event_type, &key, &value).await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let services = h.registry.services();
        for route in h.routes.routes() {
            assert!(
                services.contains(&route.service_full_name),
                "route {} points at unregistered {}",
                route.http_path,
                route.service_full_name
            );
        }

        let registered = reconciler.registered.lock().await;
        let mut expected: Vec<String> = registered
            .values()
            .flat_map(|d| d.service_names())
            .map(str::to_string)
            .collect();
        expected.sort();
        assert_eq!(services, expected);
        for description in registered.values() {
            for (service, method, _) in description.http_methods() {
                assert!(h
                    .routes
                    .get_route_by_grpc_method(&service.grpc_method(method))
                    .is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_compacted_resume_point_schedules_resync() {
        let kv = Arc::new(MemoryStore::with_history(1));
        let h = harness_on(kv.clone());
        h.store.add_config(new_echo("rr")).await.unwrap();
        kv.put("/test/unrelated", b"x".to_vec()).await.unwrap();

        let mut next_revision: Revision = 1;
        let mut pending_resync = false;
        let err = match h.reconciler.subscribe(&mut next_revision, &mut pending_resync).await {
            Ok(_) => panic!("revision 1 is no longer retained"),
            Err(e) => e,
        };
        assert!(err.is_compacted());
        assert!(pending_resync);
        assert!(h.routes.is_empty());

        h.reconciler
            .subscribe(&mut next_revision, &mut pending_resync)
            .await
            .unwrap();
        assert!(!pending_resync);
        assert_eq!(next_revision, kv.current_revision().await.unwrap() + 1);
        assert!(h.routes.get_route("/api/v1/echo").is_some());
        assert!(h.registry.pick("echo.v1.Echo", "").is_some());
    }
}
