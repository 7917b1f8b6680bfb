//! Session key files.
//!
//! A key file is a JSON array of [`SessionKeyRecord`]s, each carrying the
//! base64 export of one inbound session.

use backscroll_crypto::{ExportedSessionKey, GroupSessionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LOG_DB, MegolmSessionIndex, SessionKeyStore, StorageError};

/// One exported session in a key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeyRecord {
    /// Room the session belongs to
    pub room_id: String,
    /// Group session id
    pub session_id: String,
    /// Curve25519 key of the sending device
    pub sender_key: String,
    /// Base64 export of the ratchet
    pub session_key: String,
}

/// Errors while importing a key file.
#[derive(Error, Debug)]
pub enum KeyImportError {
    /// File is not a JSON array of records
    #[error("invalid key file: {0}")]
    Json(#[from] serde_json::Error),

    /// A record's key does not decode
    #[error("invalid session key for {session_id}: {source}")]
    InvalidKey {
        /// Session id of the offending record
        session_id: String,
        /// Decoding failure
        source: GroupSessionError,
    },

    /// Store rejected the write
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Import every record in `json` into `store`.
///
/// Returns the number of sessions that were new or improved on a stored one.
/// Records are written one by one; a failure leaves earlier records stored.
pub fn import_session_keys<S: SessionKeyStore + ?Sized>(
    store: &S,
    json: &str,
) -> Result<usize, KeyImportError> {
    let records: Vec<SessionKeyRecord> = serde_json::from_str(json)?;

    let mut imported = 0;
    for record in &records {
        let export = ExportedSessionKey::from_base64(&record.session_id, &record.session_key)
            .map_err(|source| KeyImportError::InvalidKey {
                session_id: record.session_id.clone(),
                source,
            })?;
        let index = MegolmSessionIndex::new(
            record.room_id.as_str(),
            record.session_id.as_str(),
            record.sender_key.as_str(),
        );
        if store.save_inbound_session(&index, &export)? {
            imported += 1;
        }
    }

    tracing::info!(target: LOG_DB, total = records.len(), imported, "imported session keys");
    Ok(imported)
}

/// Serialize every session in `store` as a key file.
pub fn export_session_keys<S: SessionKeyStore + ?Sized>(
    store: &S,
) -> Result<String, KeyImportError> {
    let records: Vec<_> = store
        .sessions()?
        .into_iter()
        .map(|(index, export)| SessionKeyRecord {
            room_id: index.room_id,
            session_id: index.session_id,
            sender_key: index.sender_key,
            session_key: export.to_base64(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

#[cfg(test)]
mod tests {
    use backscroll_crypto::OutboundGroupSession;

    use super::*;
    use crate::{MemorySessionStore, SessionStore};

    #[test]
    fn export_then_import_into_fresh_store() {
        let source = MemorySessionStore::new();
        for seed in 0..3u8 {
            let outbound = OutboundGroupSession::new(&[seed; 32]);
            let index = MegolmSessionIndex::new("!r:x", outbound.session_id(), "k");
            source.save_inbound_session(&index, &outbound.export()).unwrap();
        }

        let file = export_session_keys(&source).unwrap();
        let target = MemorySessionStore::new();
        assert_eq!(import_session_keys(&target, &file).unwrap(), 3);
        assert_eq!(import_session_keys(&target, &file).unwrap(), 0);
        assert_eq!(target.sessions().unwrap(), source.sessions().unwrap());
    }

    #[test]
    fn bad_key_names_the_session() {
        let json = r#"[{"room_id":"!r","session_id":"s1","sender_key":"k","session_key":"@@@"}]"#;
        let err = import_session_keys(&MemorySessionStore::new(), json).unwrap_err();
        assert!(matches!(err, KeyImportError::InvalidKey { ref session_id, .. } if session_id == "s1"));
    }

    #[test]
    fn non_array_is_rejected() {
        let err = import_session_keys(&MemorySessionStore::new(), "{}").unwrap_err();
        assert!(matches!(err, KeyImportError::Json(_)));
    }

    #[test]
    fn imported_session_is_found_by_index() {
        let outbound = OutboundGroupSession::new(&[9; 32]);
        let json = serde_json::json!([{
            "room_id": "!r:x",
            "session_id": outbound.session_id(),
            "sender_key": "k",
            "session_key": outbound.export().to_base64(),
        }])
        .to_string();

        let store = MemorySessionStore::new();
        import_session_keys(&store, &json).unwrap();
        let index = MegolmSessionIndex::new("!r:x", outbound.session_id(), "k");
        assert!(store.has_inbound_session(&index).unwrap());
    }
}
