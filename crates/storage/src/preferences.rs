//! Typed access to the key-value settings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sos_activation::IdentitySource;
use sos_contacts::{ContactError, ContactStore, EmergencyContact};

use crate::Result;

/// Settings keys.
pub mod keys {
    pub const ONBOARDING: &str = "sos-onboarding";
    pub const USER_NAME: &str = "sos-username";
    pub const CONTACTS: &str = "sos-contacts";
    pub const SHAKE_ENABLED: &str = "sos-shake-enabled";
    pub const CONFIG: &str = "sos-config";
}

/// Raw string storage behind [`Preferences`].
pub trait PreferenceStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;
    fn set_raw(&self, key: &str, value: &str) -> Result<()>;
    fn remove_raw(&self, key: &str) -> Result<()>;
}

pub type PreferenceStoreRef = Arc<dyn PreferenceStore>;

/// Ephemeral store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// JSON-encoded preferences over a [`PreferenceStore`].
#[derive(Clone)]
pub struct Preferences {
    store: PreferenceStoreRef,
}

impl Preferences {
    pub fn new(store: PreferenceStoreRef) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Read `key`, or `default` when it is missing, unreadable or does not
    /// decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, "falling back to default preference: {}", e);
                default
            }
        }
    }

    /// Read and decode `key`, surfacing storage and decode errors.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set_raw(key, &raw)?;
        tracing::debug!(key, "preference saved");
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove_raw(key)
    }

    pub fn onboarding_complete(&self) -> bool {
        self.get(keys::ONBOARDING, false)
    }

    pub fn set_onboarding_complete(&self, complete: bool) -> Result<()> {
        self.set(keys::ONBOARDING, &complete)
    }

    pub fn user_name(&self) -> String {
        self.get(keys::USER_NAME, String::new())
    }

    pub fn set_user_name(&self, name: &str) -> Result<()> {
        self.set(keys::USER_NAME, name)
    }

    /// Shake triggering is on unless the user turned it off.
    pub fn shake_enabled(&self) -> bool {
        self.get(keys::SHAKE_ENABLED, true)
    }

    pub fn set_shake_enabled(&self, enabled: bool) -> Result<()> {
        self.set(keys::SHAKE_ENABLED, &enabled)
    }

    /// Session configuration stored under [`keys::CONFIG`].
    pub fn config<T: DeserializeOwned + Default>(&self) -> T {
        self.get(keys::CONFIG, T::default())
    }

    pub fn set_config<T: Serialize>(&self, config: &T) -> Result<()> {
        self.set(keys::CONFIG, config)
    }
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

impl IdentitySource for Preferences {
    fn user_name(&self) -> String {
        Preferences::user_name(self)
    }
}

impl ContactStore for Preferences {
    fn load_contacts(&self) -> std::result::Result<Vec<EmergencyContact>, ContactError> {
        match self.try_get(keys::CONTACTS) {
            Ok(contacts) => Ok(contacts.unwrap_or_default()),
            Err(crate::StorageError::SerializationError(e)) => {
                tracing::warn!("stored contacts unreadable, starting empty: {}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(ContactError::Persistence(e.to_string())),
        }
    }

    fn save_contacts(&self, contacts: &[EmergencyContact]) -> std::result::Result<(), ContactError> {
        self.set(keys::CONTACTS, contacts)
            .map_err(|e| ContactError::Persistence(e.to_string()))
    }
}
