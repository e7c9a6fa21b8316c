//! Persistent key-value storage for session data.
//!
//! This module provides:
//! - `KeyValueStore`: the get/set/remove contract a backing store fulfils
//! - `MemoryStore`, `FileStore`, `KeyringStore`: in-process, JSON file and
//!   OS keychain backends
//! - `SessionStore`: typed access to the three session fields

pub mod file;
pub mod keychain;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use tracing::warn;

use crate::error::StoreError;

pub use file::FileStore;
pub use keychain::KeyringStore;

/// Store key for the username
pub const KEY_USERNAME: &str = "username";

/// Store key for the encoded `Authorization` header value
pub const KEY_AUTH: &str = "auth";

/// Store key for the last-activity timestamp
pub const KEY_LAST_ACTIVITY: &str = "last-activity";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Non-persistent store, useful for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Typed view of the session fields held in a `KeyValueStore`.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn username(&self) -> Result<Option<String>, StoreError> {
        self.inner.get(KEY_USERNAME)
    }

    pub fn auth_header(&self) -> Result<Option<String>, StoreError> {
        self.inner.get(KEY_AUTH)
    }

    /// Last recorded activity. An unreadable timestamp counts as absent.
    pub fn last_activity(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.inner.get(KEY_LAST_ACTIVITY)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!(value = %raw, error = %e, "Unreadable last-activity timestamp");
                Ok(None)
            }
        }
    }

    /// Write username, header and activity stamp. On a failed write, whatever
    /// was already written is removed again so no partial session remains.
    pub fn write_credentials(
        &self,
        username: &str,
        auth_header: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = self
            .inner
            .set(KEY_USERNAME, username)
            .and_then(|_| self.inner.set(KEY_AUTH, auth_header))
            .and_then(|_| self.write_last_activity(at));

        if result.is_err() {
            if let Err(e) = self.clear() {
                warn!(error = %e, "Failed to roll back partial credentials");
            }
        }
        result
    }

    pub fn write_last_activity(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.set(
            KEY_LAST_ACTIVITY,
            &at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    /// Remove all three fields. Every removal is attempted; the first
    /// failure is returned.
    pub fn clear(&self) -> Result<(), StoreError> {
        let results = [
            self.inner.remove(KEY_AUTH),
            self.inner.remove(KEY_LAST_ACTIVITY),
            self.inner.remove(KEY_USERNAME),
        ];
        results.into_iter().collect()
    }
}
