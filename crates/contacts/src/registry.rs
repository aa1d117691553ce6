//! In-memory contact list with write-through persistence.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{ContactStoreRef, EmergencyContact, NewContact, NullContactStore, Result};

struct Inner {
    contacts: Vec<EmergencyContact>,
    /// Last numeric id handed out, for strictly increasing ids.
    last_id: i64,
}

/// Ordered set of emergency contacts with exactly one primary when non-empty.
///
/// Every mutation builds the next list, persists it, and only then swaps it
/// in, all under the write lock. Readers never observe a list without a
/// primary, and a failed write leaves the registry untouched.
pub struct ContactRegistry {
    store: ContactStoreRef,
    inner: RwLock<Inner>,
}

impl ContactRegistry {
    /// Empty registry backed by `store`.
    pub fn new(store: ContactStoreRef) -> Self {
        Self {
            store,
            inner: RwLock::new(Inner {
                contacts: Vec::new(),
                last_id: 0,
            }),
        }
    }

    /// Registry that persists nothing.
    pub fn in_memory() -> Self {
        Self::new(std::sync::Arc::new(NullContactStore))
    }

    /// Restore the persisted list, repairing the primary flag if needed.
    pub fn load(store: ContactStoreRef) -> Result<Self> {
        let mut contacts = store.load_contacts()?;
        if normalize_primary(&mut contacts) {
            tracing::warn!(
                count = contacts.len(),
                "stored contacts violated the primary invariant, repaired"
            );
            store.save_contacts(&contacts)?;
        }

        let last_id = contacts
            .iter()
            .filter_map(|c| c.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);

        tracing::debug!(count = contacts.len(), "contacts loaded");
        Ok(Self {
            store,
            inner: RwLock::new(Inner { contacts, last_id }),
        })
    }

    /// Append a contact and return it with its generated id.
    ///
    /// The first contact always becomes primary. A contact added as primary
    /// takes the flag from the previous one.
    pub fn add_contact(&self, new: NewContact) -> Result<EmergencyContact> {
        new.validate()?;

        let mut inner = self.write();
        let id = next_id(&mut inner);
        let is_primary = new.is_primary || inner.contacts.is_empty();

        let contact = EmergencyContact {
            id,
            name: new.name.trim().to_string(),
            phone: new.phone.trim().to_string(),
            relationship: new.relationship,
            is_primary,
        };

        let mut next = inner.contacts.clone();
        if is_primary {
            for c in &mut next {
                c.is_primary = false;
            }
        }
        next.push(contact.clone());
        self.commit(&mut inner, next)?;

        tracing::info!(id = %contact.id, primary = contact.is_primary, "contact added");
        Ok(contact)
    }

    /// Make `id` the only primary contact.
    ///
    /// Returns false without touching anything when `id` is unknown; stale
    /// ids from a racing UI are tolerated.
    pub fn set_primary(&self, id: &str) -> Result<bool> {
        let mut inner = self.write();
        if !inner.contacts.iter().any(|c| c.id == id) {
            tracing::debug!(id, "set_primary ignored, unknown contact");
            return Ok(false);
        }

        let next = inner
            .contacts
            .iter()
            .cloned()
            .map(|mut c| {
                c.is_primary = c.id == id;
                c
            })
            .collect();
        self.commit(&mut inner, next)?;

        tracing::info!(id, "primary contact updated");
        Ok(true)
    }

    /// Remove `id`, promoting the first remaining contact if it was primary.
    ///
    /// Returns the removed contact, or `None` when `id` is unknown.
    pub fn remove_contact(&self, id: &str) -> Result<Option<EmergencyContact>> {
        let mut inner = self.write();
        let Some(index) = inner.contacts.iter().position(|c| c.id == id) else {
            tracing::debug!(id, "remove_contact ignored, unknown contact");
            return Ok(None);
        };

        let mut next = inner.contacts.clone();
        let removed = next.remove(index);
        if removed.is_primary {
            if let Some(first) = next.first_mut() {
                first.is_primary = true;
                tracing::info!(id = %first.id, "promoted to primary");
            }
        }
        self.commit(&mut inner, next)?;

        tracing::info!(id, "contact removed");
        Ok(Some(removed))
    }

    /// Snapshot in insertion order.
    pub fn contacts(&self) -> Vec<EmergencyContact> {
        self.read().contacts.clone()
    }

    pub fn get(&self, id: &str) -> Option<EmergencyContact> {
        self.read().contacts.iter().find(|c| c.id == id).cloned()
    }

    pub fn primary(&self) -> Option<EmergencyContact> {
        self.read().contacts.iter().find(|c| c.is_primary).cloned()
    }

    /// Alert recipients: the primary first, the rest in insertion order.
    pub fn recipients(&self) -> Vec<EmergencyContact> {
        let inner = self.read();
        let (mut ordered, rest): (Vec<_>, Vec<_>) =
            inner.contacts.iter().cloned().partition(|c| c.is_primary);
        ordered.extend(rest);
        ordered
    }

    pub fn len(&self) -> usize {
        self.read().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().contacts.is_empty()
    }

    fn commit(&self, inner: &mut Inner, next: Vec<EmergencyContact>) -> Result<()> {
        if let Err(e) = self.store.save_contacts(&next) {
            tracing::warn!("contact write-through failed, change discarded: {}", e);
            return Err(e);
        }
        inner.contacts = next;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ContactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactRegistry")
            .field("contacts", &self.read().contacts)
            .finish_non_exhaustive()
    }
}

/// Timestamp-based id. `last_id` covers every numeric id loaded or issued,
/// so the result is always fresh.
fn next_id(inner: &mut Inner) -> String {
    let candidate = chrono::Utc::now().timestamp_millis().max(inner.last_id + 1);
    inner.last_id = candidate;
    candidate.to_string()
}

/// Enforce exactly one primary on a non-empty list. Returns true if changed.
fn normalize_primary(contacts: &mut [EmergencyContact]) -> bool {
    if contacts.is_empty() {
        return false;
    }
    let keep = contacts.iter().position(|c| c.is_primary).unwrap_or(0);

    let mut changed = false;
    for (i, c) in contacts.iter_mut().enumerate() {
        let should = i == keep;
        if c.is_primary != should {
            c.is_primary = should;
            changed = true;
        }
    }
    changed
}
