pub mod config;
pub mod driver;
pub mod import;
pub mod schema;
