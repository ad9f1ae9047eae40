//! The session's "current user".
//!
//! A single slot shared by every component that needs a user scope. Clones
//! share the same slot, so handing a clone to a component is how it joins
//! the session.

use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
pub struct SessionIdentity {
    slot: Arc<RwLock<Option<String>>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(id: &str) -> Self {
        let session = Self::new();
        session.set_identity(id);
        session
    }

    /// Overwrites the slot when `id` is non-empty after trimming. Returns
    /// whether the slot was written.
    pub fn set_identity(&self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        let mut guard = match self.slot.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("session identity lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        };
        if guard.as_deref() != Some(id) {
            tracing::debug!(user_id = %id, "session identity updated");
        }
        *guard = Some(id.to_owned());
        true
    }

    pub fn identity(&self) -> Option<String> {
        match self.slot.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// An explicit non-empty id wins and becomes the session identity;
    /// otherwise the cached one is used.
    pub fn resolve(&self, explicit: Option<&str>) -> Option<String> {
        match explicit {
            Some(id) if self.set_identity(id) => self.identity(),
            _ => self.identity(),
        }
    }
}
