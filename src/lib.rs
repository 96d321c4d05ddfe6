pub mod gateway;
pub mod modules;
pub mod shared;

pub use gateway::{
    ConfigDbRequest, ConfigDbResponse, ImportDbRequest, ImportDbResponse, RequestGateway,
};
pub use modules::config::{ConfigHandle, ConnectionConfig, Credentials, DriverKind};
pub use modules::import::{
    CoordinatorConfig, ImportCoordinator, ImportOptions, ImportSource, JobId, JobStatus,
    OnErrorPolicy, SourceFormat,
};
pub use shared::errors::{AppError, AppResult, ErrorKind};
pub use shared::utils::logger::init_logger;

/// Build a ready-to-use gateway backed by a coordinator with the built-in
/// drivers registered.
pub fn new_gateway() -> RequestGateway {
    init_logger();
    RequestGateway::new(ImportCoordinator::new(CoordinatorConfig::default()))
}
