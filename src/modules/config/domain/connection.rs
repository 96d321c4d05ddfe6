use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modules::schema::SchemaSet;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::Validator;

/// Which driver backs a configured database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Sqlite,
    Memory,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Sqlite => write!(f, "sqlite"),
            DriverKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for DriverKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(DriverKind::Sqlite),
            "memory" => Ok(DriverKind::Memory),
            other => Err(AppError::InvalidInput(format!(
                "Unknown driver: '{}'",
                other
            ))),
        }
    }
}

/// Database secret. Never printed: `Debug` and `Display` both redact, and
/// the value is skipped on serialization. Drivers read it through
/// [`Credentials::reveal`].
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    secret: Option<String>,
}

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Credentials {
            secret: Some(secret.into()),
        }
    }

    pub fn none() -> Self {
        Credentials { secret: None }
    }

    pub fn is_none(&self) -> bool {
        self.secret.is_none()
    }

    pub fn reveal(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.secret {
            Some(_) => write!(f, "Credentials(<redacted>)"),
            None => write!(f, "Credentials(none)"),
        }
    }
}

impl Serialize for Credentials {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.secret {
            Some(_) => serializer.serialize_str("<redacted>"),
            None => serializer.serialize_none(),
        }
    }
}

/// Identity of a configured database. Two configs describe the same
/// database when driver and locator match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigIdentity {
    pub driver: DriverKind,
    pub locator: String,
}

/// Full connection config as accepted by `config_db`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub driver: DriverKind,
    /// Path or URI of the target database. For sqlite this is the file
    /// path; the memory driver uses it as a namespace name.
    pub locator: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How long a driver waits on a locked database before failing a
    /// write. The memory driver ignores it.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Tables to provision on acceptance. Empty means tables are created
    /// on the fly from the first chunk of each import source.
    #[serde(default)]
    pub schema: SchemaSet,
}

fn default_pool_size() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl ConnectionConfig {
    pub fn new(driver: DriverKind, locator: impl Into<String>) -> Self {
        ConnectionConfig {
            driver,
            locator: locator.into(),
            credentials: Credentials::none(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            schema: SchemaSet::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_schema(mut self, schema: SchemaSet) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    pub fn identity(&self) -> ConfigIdentity {
        ConfigIdentity {
            driver: self.driver,
            locator: self.locator.clone(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        Validator::validate_locator(&self.locator)?;
        Validator::validate_pool_size(self.pool_size)?;
        Validator::validate_timeout_ms(self.busy_timeout_ms, "Busy timeout")?;
        Ok(())
    }
}
