// Shared kernel: error types and cross-cutting utilities

pub mod errors; // Shared error types
pub mod utils; // Logging, retry, validation helpers

// Re-exports for convenience
pub use errors::{AppError, AppResult, ErrorKind};
