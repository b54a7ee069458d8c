pub mod core;
pub mod gateway;
pub mod observability;
pub mod registry_source;

pub use gateway::GatewayTransport;
pub use registry_source::RegistrySource;
