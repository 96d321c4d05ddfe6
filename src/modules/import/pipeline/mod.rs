pub mod reader;
pub mod runner;

pub use runner::ImportRunner;
