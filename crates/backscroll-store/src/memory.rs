#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use backscroll_crypto::{ExportedSessionKey, InboundGroupSession};

use crate::{MegolmSessionIndex, SessionKeyStore, SessionStore, StorageError, is_better_export};

type SessionMap = HashMap<MegolmSessionIndex, ExportedSessionKey>;

/// In-memory session store for tests and one-shot tools.
///
/// Clones share the same map. A poisoned lock surfaces as `StorageError::Io`
/// from the store methods.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<SessionMap>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }

    /// Whether no session is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionMap>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("session map lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError> {
        Ok(self.lock()?.contains_key(index))
    }

    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError> {
        let inner = self.lock()?;
        inner
            .get(index)
            .map(InboundGroupSession::import)
            .ok_or_else(|| StorageError::MissingSession { session_id: index.session_id.clone() })
    }
}

impl SessionKeyStore for MemorySessionStore {
    fn save_inbound_session(
        &self,
        index: &MegolmSessionIndex,
        export: &ExportedSessionKey,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;
        if !is_better_export(inner.get(index), export) {
            return Ok(false);
        }
        inner.insert(index.clone(), export.clone());
        Ok(true)
    }

    fn sessions(&self) -> Result<Vec<(MegolmSessionIndex, ExportedSessionKey)>, StorageError> {
        let inner = self.lock()?;
        let mut sessions: Vec<_> = inner.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(sessions)
    }
}
