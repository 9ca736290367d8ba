//! HTTP path ⇄ RPC method route table.
//!
//! # Responsibilities
//! - Index routes by HTTP path and by gRPC method
//! - Load and remove all routes of one descriptor as a unit
//! - Identify gateway-internal services
//!
//! # Design Decisions
//! - gRPC method lookups are case-insensitive (keys stored lowercased)
//! - Removal recomputes the keys a load would produce, so it is idempotent
//!   and safe for descriptors that were never loaded

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::descriptor::{HttpRule, HttpVerb, ServiceDescription};
use crate::observability::metrics::ROUTES;

/// Route metadata for one HTTP-mapped method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub http_path: String,
    pub service_full_name: String,
    pub method_name: String,
    pub http_verb: HttpVerb,
    pub auth_required: bool,
    pub use_json_response: bool,
}

impl RouteEntry {
    /// gRPC method path, e.g. `/echo.v1.Echo/Echo`.
    pub fn grpc_method(&self) -> String {
        format!("/{}/{}", self.service_full_name, self.method_name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Indexes {
    by_path: HashMap<String, RouteEntry>,
    by_method: HashMap<String, RouteEntry>,
}

/// Process-wide route index.
#[derive(Debug, Default)]
pub struct RouteTable {
    indexes: RwLock<Indexes>,
    local_services: HashSet<String>,
}

impl RouteTable {
    /// Create an empty table. `local_services` are fully-qualified service
    /// names implemented by the gateway itself.
    pub fn new<I, S>(local_services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            indexes: RwLock::default(),
            local_services: local_services
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.indexes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.indexes.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert one entry per HTTP-mapped method of `description`.
    /// Returns the number of routes inserted.
    pub fn load_all_routers(&self, description: &ServiceDescription) -> usize {
        let entries = entries_for(description);
        let count = entries.len();
        let mut indexes = self.write();
        for (primary, entry) in entries {
            if let Some(previous) = indexes.by_path.get(&entry.http_path) {
                if previous.grpc_method() != entry.grpc_method() {
                    tracing::warn!(
                        path = %entry.http_path,
                        previous = %previous.grpc_method(),
                        current = %entry.grpc_method(),
                        "Route path reassigned"
                    );
                }
            }
            if primary {
                indexes
                    .by_method
                    .insert(method_key(&entry.grpc_method()), entry.clone());
            }
            indexes.by_path.insert(entry.http_path.clone(), entry);
        }
        let total = indexes.by_path.len();
        drop(indexes);

        metrics::gauge!(ROUTES).set(total as f64);
        tracing::debug!(routes = count, total, "Routes loaded");
        count
    }

    /// Remove exactly the entries [`load_all_routers`](Self::load_all_routers)
    /// would produce for `description`. Returns the number removed.
    pub fn delete_routers(&self, description: &ServiceDescription) -> usize {
        let entries = entries_for(description);
        let mut indexes = self.write();
        let mut removed = 0;
        for (primary, entry) in entries {
            let method = method_key(&entry.grpc_method());
            // Only drop a path that still belongs to this method; another
            // descriptor may have claimed it since.
            let owned = indexes
                .by_path
                .get(&entry.http_path)
                .is_some_and(|current| method_key(&current.grpc_method()) == method);
            if owned {
                indexes.by_path.remove(&entry.http_path);
                removed += 1;
            }
            if primary
                && indexes
                    .by_method
                    .get(&method)
                    .is_some_and(|current| current.http_path == entry.http_path)
            {
                indexes.by_method.remove(&method);
            }
        }
        let total = indexes.by_path.len();
        drop(indexes);

        metrics::gauge!(ROUTES).set(total as f64);
        tracing::debug!(routes = removed, total, "Routes deleted");
        removed
    }

    pub fn get_route(&self, path: &str) -> Option<RouteEntry> {
        self.read().by_path.get(path).cloned()
    }

    /// Look up by gRPC method path, ignoring case.
    pub fn get_route_by_grpc_method(&self, method: &str) -> Option<RouteEntry> {
        self.read().by_method.get(&method_key(method)).cloned()
    }

    /// Whether `method` (`/pkg.Service/Method` or a bare service name)
    /// belongs to a gateway-internal service.
    pub fn is_local_srv(&self, method: &str) -> bool {
        let trimmed = method.trim_start_matches('/');
        let service = trimmed.split('/').next().unwrap_or(trimmed);
        self.local_services.contains(&service.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, sorted by path.
    pub fn routes(&self) -> Vec<RouteEntry> {
        let mut routes: Vec<_> = self.read().by_path.values().cloned().collect();
        routes.sort_by(|a, b| a.http_path.cmp(&b.http_path));
        routes
    }
}

fn method_key(method: &str) -> String {
    method.to_ascii_lowercase()
}

/// Every route of `description`, flagged `true` for a method's primary
/// binding. Only primary bindings enter the gRPC-method index.
fn entries_for(description: &ServiceDescription) -> Vec<(bool, RouteEntry)> {
    let mut entries = Vec::new();
    for (service, method, rule) in description.http_methods() {
        let entry = |rule: &HttpRule| RouteEntry {
            http_path: rule.path.clone(),
            service_full_name: service.full_name.clone(),
            method_name: method.name.clone(),
            http_verb: rule.verb.clone(),
            auth_required: service.auth_required,
            use_json_response: service.use_json_response,
        };
        entries.push((true, entry(rule)));
        entries.extend(rule.additional_bindings.iter().map(|binding| (false, entry(binding))));
    }
    entries
}
