pub mod connection;
pub mod handle;

pub use connection::{ConfigIdentity, ConnectionConfig, Credentials, DriverKind};
pub use handle::ConfigHandle;
