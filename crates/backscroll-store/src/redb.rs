//! Redb-backed durable session store.
//!
//! Sessions are written in their own transaction and survive restarts.

use std::{path::Path, sync::Arc};

use backscroll_crypto::{ExportedSessionKey, InboundGroupSession};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{MegolmSessionIndex, SessionKeyStore, SessionStore, StorageError, is_better_export};

/// Table: `inbound_sessions`
/// Key: `room_id`, `session_id` and `sender_key` joined by NUL bytes
/// Value: CBOR-encoded `StoredSession`
const INBOUND_SESSIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("inbound_sessions");

/// Persisted form of an inbound session.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    room_id: String,
    session_id: String,
    sender_key: String,
    message_index: u32,
    chain_key: Vec<u8>,
}

impl StoredSession {
    fn new(index: &MegolmSessionIndex, export: &ExportedSessionKey) -> Self {
        Self {
            room_id: index.room_id.clone(),
            session_id: index.session_id.clone(),
            sender_key: index.sender_key.clone(),
            message_index: export.message_index(),
            chain_key: export.chain_key().to_vec(),
        }
    }

    fn into_parts(self) -> Result<(MegolmSessionIndex, ExportedSessionKey), StorageError> {
        let chain_key: [u8; 32] = self.chain_key.as_slice().try_into().map_err(|_| {
            StorageError::Corrupted(format!(
                "chain key for session {} has {} bytes",
                self.session_id,
                self.chain_key.len()
            ))
        })?;
        let export = ExportedSessionKey::new(self.session_id.clone(), self.message_index, chain_key);
        let index = MegolmSessionIndex::new(self.room_id, self.session_id, self.sender_key);
        Ok((index, export))
    }
}

/// Durable session store backed by Redb.
///
/// Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbSessionStore {
    db: Arc<Database>,
}

impl RedbSessionStore {
    /// Open or create a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(INBOUND_SESSIONS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn load(&self, index: &MegolmSessionIndex) -> Result<Option<StoredSession>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table =
            txn.open_table(INBOUND_SESSIONS).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_key(index);
        let Some(value) = table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?
        else {
            return Ok(None);
        };
        decode_session(value.value()).map(Some)
    }
}

impl SessionStore for RedbSessionStore {
    fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table =
            txn.open_table(INBOUND_SESSIONS).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_key(index);
        let found = table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(found.is_some())
    }

    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError> {
        let stored = self
            .load(index)?
            .ok_or_else(|| StorageError::MissingSession { session_id: index.session_id.clone() })?;
        let (_, export) = stored.into_parts()?;
        Ok(InboundGroupSession::import(&export))
    }
}

impl SessionKeyStore for RedbSessionStore {
    fn save_inbound_session(
        &self,
        index: &MegolmSessionIndex,
        export: &ExportedSessionKey,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let replaced = {
            let mut table =
                txn.open_table(INBOUND_SESSIONS).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_key(index);

            let existing = match table
                .get(key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
            {
                Some(value) => Some(decode_session(value.value())?.into_parts()?.1),
                None => None,
            };

            if is_better_export(existing.as_ref(), export) {
                let mut value = Vec::new();
                ciborium::into_writer(&StoredSession::new(index, export), &mut value)
                    .map_err(|e| StorageError::Io(format!("CBOR encode failed: {e}")))?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
                true
            } else {
                false
            }
        };
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        if replaced {
            tracing::debug!(
                target: crate::LOG_DB,
                session_id = %index.session_id,
                message_index = export.message_index(),
                "stored inbound session"
            );
        }
        Ok(replaced)
    }

    fn sessions(&self) -> Result<Vec<(MegolmSessionIndex, ExportedSessionKey)>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table =
            txn.open_table(INBOUND_SESSIONS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut sessions = Vec::new();
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            sessions.push(decode_session(value.value())?.into_parts()?);
        }
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(sessions)
    }
}

fn encode_key(index: &MegolmSessionIndex) -> Vec<u8> {
    let mut key = Vec::with_capacity(
        index.room_id.len() + index.session_id.len() + index.sender_key.len() + 2,
    );
    key.extend_from_slice(index.room_id.as_bytes());
    key.push(0);
    key.extend_from_slice(index.session_id.as_bytes());
    key.push(0);
    key.extend_from_slice(index.sender_key.as_bytes());
    key
}

fn decode_session(bytes: &[u8]) -> Result<StoredSession, StorageError> {
    ciborium::from_reader(bytes)
        .map_err(|e| StorageError::Corrupted(format!("CBOR decode failed: {e}")))
}
