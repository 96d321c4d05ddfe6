pub mod domain;
pub mod registry;

pub use domain::{ConfigHandle, ConnectionConfig, Credentials, DriverKind};
pub use registry::{ConfigRegistry, RegisteredConfig};
