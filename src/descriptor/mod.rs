//! Schema loading subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint.descriptor_set (FileDescriptorSet bytes)
//!     → loader.rs (stage to scratch dir, resolve imports, read options)
//!     → ServiceDescription (services, methods, HTTP rules, service flags)
//!     → RouteTable / GatewayFacade
//! ```
//!
//! # Design Decisions
//! - Loading is a pure function of the bytes; no global descriptor registry
//! - Scratch files live in a per-call directory removed on every exit path
//! - HTTP mapping comes from `google.api.http`, including one level of
//!   `additional_bindings`; service flags from `gateway.auth_required`
//!   and `gateway.json_response`

pub mod fixture;
pub mod loader;

use std::fmt;

pub use loader::{load, DescriptorLoader};

/// Extension carrying a method's HTTP mapping.
pub const HTTP_RULE_EXTENSION: &str = "google.api.http";
/// Service option marking every route of the service as authenticated.
pub const AUTH_REQUIRED_EXTENSION: &str = "gateway.auth_required";
/// Service option asking the gateway to answer with JSON instead of protobuf.
pub const JSON_RESPONSE_EXTENSION: &str = "gateway.json_response";

/// HTTP verb of a mapped method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Get,
    Put,
    Post,
    Delete,
    Patch,
    Custom(String),
}

impl HttpVerb {
    pub fn as_str(&self) -> &str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Put => "PUT",
            HttpVerb::Post => "POST",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Custom(kind) => kind,
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The HTTP mapping of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRule {
    pub verb: HttpVerb,
    pub path: String,
    /// Request field bound to the HTTP body (`*` for the whole message).
    pub body: String,
    /// Further mappings of the same method. Always empty on a nested rule.
    pub additional_bindings: Vec<HttpRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescription {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub http: Option<HttpRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Fully-qualified name, e.g. `echo.v1.Echo`.
    pub full_name: String,
    pub auth_required: bool,
    pub use_json_response: bool,
    pub methods: Vec<MethodDescription>,
}

impl ServiceInfo {
    /// gRPC method path, e.g. `/echo.v1.Echo/Echo`.
    pub fn grpc_method(&self, method: &MethodDescription) -> String {
        format!("/{}/{}", self.full_name, method.name)
    }
}

/// Everything the gateway needs from one descriptor set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescription {
    pub services: Vec<ServiceInfo>,
}

impl ServiceDescription {
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.full_name.as_str()).collect()
    }

    /// Every `(service, method, rule)` that carries an HTTP mapping.
    pub fn http_methods(&self) -> impl Iterator<Item = (&ServiceInfo, &MethodDescription, &HttpRule)> {
        self.services.iter().flat_map(|service| {
            service
                .methods
                .iter()
                .filter_map(move |method| method.http.as_ref().map(|rule| (service, method, rule)))
        })
    }
}
