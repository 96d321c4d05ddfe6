pub mod logger;
pub mod retry;
pub mod validation;

pub use retry::RetryPolicy;
pub use validation::Validator;
