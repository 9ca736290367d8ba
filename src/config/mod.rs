//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → sections handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; endpoint changes flow through the store, not the file
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AdminConfig;
pub use schema::DescriptorConfig;
pub use schema::GatewayConfig;
pub use schema::LoadBalancerConfig;
pub use schema::ObservabilityConfig;
pub use schema::RoutingConfig;
pub use schema::StoreConfig;
pub use schema::WatcherConfig;
