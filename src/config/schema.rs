//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! control plane. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Configuration store layout.
    pub store: StoreConfig,

    /// Admin API listener and credentials.
    pub admin: AdminConfig,

    /// Descriptor loading settings.
    pub descriptor: DescriptorConfig,

    /// Load balancer tuning.
    pub load_balancer: LoadBalancerConfig,

    /// Change-feed subscription settings.
    pub watcher: WatcherConfig,

    /// Route table settings.
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Configuration store layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix under which detail records and tag index entries live.
    pub endpoints_prefix: String,

    /// Directory served by the filesystem blob store (bundled descriptors).
    pub blob_dir: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints_prefix: "/gateway/endpoints".to_string(),
            blob_dir: None,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Admin API bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Descriptor loading configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Directory in which per-load scratch directories are created.
    /// Falls back to the OS temp dir when unset.
    pub cache_dir: Option<String>,
}

/// Load balancer tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Virtual nodes per backend on the consistent hash ring.
    pub hash_replicas: usize,

    /// Idle pooled connections kept per backend.
    pub pool_max_idle_per_host: usize,

    /// Constant added to in-flight counts by SED/NQ: `(in_flight + overhead) / weight`.
    pub sed_overhead: u32,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            hash_replicas: 160,
            pool_max_idle_per_host: 32,
            sed_overhead: 1,
        }
    }
}

/// Change-feed subscription configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Base delay for reconnect backoff in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum delay for reconnect backoff in milliseconds.
    pub reconnect_max_ms: u64,

    /// Re-apply every stored endpoint before subscribing.
    pub resync_on_start: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 100,
            reconnect_max_ms: 5000,
            resync_on_start: true,
        }
    }
}

/// Route table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Fully-qualified names of services implemented by the gateway itself.
    pub local_services: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            local_services: vec!["gateway.admin.v1.EndpointService".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
