use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::shared::errors::{AppError, AppResult};

/// Opaque handle issued for an accepted database config. All later gateway
/// calls name the database through this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigHandle(Uuid);

impl ConfigHandle {
    pub fn new() -> Self {
        ConfigHandle(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        let id = Uuid::parse_str(s.trim())
            .map_err(|_| AppError::InvalidHandle(format!("'{}' is not a valid handle", s)))?;
        Ok(ConfigHandle(id))
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConfigHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConfigHandle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigHandle::parse(s)
    }
}
