/// In-memory registry of accepted database configs.
///
/// `register` is idempotent: resubmitting a byte-equal config returns the
/// handle that was issued the first time, while a config that names an
/// already-registered database with different settings is rejected as a
/// duplicate. Admission races on the same identity are settled by the
/// identity map's entry lock.
use dashmap::DashMap;
use std::sync::Arc;

use super::domain::{ConfigHandle, ConfigIdentity, ConnectionConfig};
use crate::shared::errors::{AppError, AppResult};

#[derive(Debug)]
pub struct RegisteredConfig {
    pub handle: ConfigHandle,
    pub config: ConnectionConfig,
}

#[derive(Debug, Default)]
pub struct ConfigRegistry {
    by_identity: DashMap<ConfigIdentity, ConfigHandle>,
    by_handle: DashMap<ConfigHandle, Arc<RegisteredConfig>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a config, returning its handle and whether this call
    /// created the registration.
    pub fn register(&self, config: ConnectionConfig) -> AppResult<(ConfigHandle, bool)> {
        use dashmap::mapref::entry::Entry;

        match self.by_identity.entry(config.identity()) {
            Entry::Occupied(entry) => {
                let handle = *entry.get();
                let existing = self.by_handle.get(&handle).ok_or_else(|| {
                    AppError::InternalError(format!(
                        "Registry entry for handle {} is missing",
                        handle
                    ))
                })?;
                if existing.config == config {
                    Ok((handle, false))
                } else {
                    Err(AppError::DuplicateConfig(format!(
                        "Database '{}' ({}) is already configured with different settings",
                        config.locator, config.driver
                    )))
                }
            }
            Entry::Vacant(entry) => {
                let handle = ConfigHandle::new();
                self.by_handle
                    .insert(handle, Arc::new(RegisteredConfig { handle, config }));
                entry.insert(handle);
                Ok((handle, true))
            }
        }
    }

    /// Drop a registration. Used to roll back when provisioning the
    /// database for a freshly accepted config fails.
    pub fn unregister(&self, handle: &ConfigHandle) {
        if let Some((_, registered)) = self.by_handle.remove(handle) {
            self.by_identity.remove(&registered.config.identity());
        }
    }

    pub fn resolve(&self, handle: &ConfigHandle) -> AppResult<Arc<RegisteredConfig>> {
        self.by_handle
            .get(handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                AppError::InvalidHandle(format!("No database configured for handle {}", handle))
            })
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
