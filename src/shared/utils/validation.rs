use regex::Regex;
use std::sync::OnceLock;

use crate::shared::errors::AppError;

/// SQL identifiers (table and column names) end up interpolated into DDL and
/// INSERT statements, so anything that is not a plain identifier is rejected
/// before it gets near a driver.
fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

pub struct Validator;

impl Validator {
    pub fn validate_identifier(name: &str, what: &str) -> Result<(), AppError> {
        if name.is_empty() {
            return Err(AppError::InvalidInput(format!("{} cannot be empty", what)));
        }
        if name.len() > 128 {
            return Err(AppError::InvalidInput(format!(
                "{} too long (max 128 characters): {}",
                what, name
            )));
        }
        if !identifier_regex().is_match(name) {
            return Err(AppError::InvalidInput(format!(
                "{} contains invalid characters: {}",
                what, name
            )));
        }
        Ok(())
    }

    pub fn validate_locator(locator: &str) -> Result<(), AppError> {
        if locator.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Locator cannot be empty".to_string(),
            ));
        }
        if locator.len() > 4096 {
            return Err(AppError::InvalidInput(
                "Locator too long (max 4096 characters)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_pool_size(pool_size: u32) -> Result<(), AppError> {
        if !(1..=64).contains(&pool_size) {
            return Err(AppError::InvalidInput(format!(
                "Pool size must be between 1 and 64, got {}",
                pool_size
            )));
        }
        Ok(())
    }

    pub fn validate_chunk_size(chunk_size: usize) -> Result<(), AppError> {
        if !(1..=100_000).contains(&chunk_size) {
            return Err(AppError::InvalidInput(format!(
                "Chunk size must be between 1 and 100000, got {}",
                chunk_size
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_ms(timeout_ms: u64, what: &str) -> Result<(), AppError> {
        if timeout_ms == 0 {
            return Err(AppError::InvalidInput(format!(
                "{} must be greater than zero",
                what
            )));
        }
        // One day is already far past any sane import budget
        if timeout_ms > 86_400_000 {
            return Err(AppError::InvalidInput(format!(
                "{} too large (max 24h), got {}ms",
                what, timeout_ms
            )));
        }
        Ok(())
    }
}
