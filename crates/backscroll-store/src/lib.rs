//! Session storage
//!
//! Inbound group session stores for the timeline's decryption pipeline. Every
//! store implements the read side ([`SessionStore`]) consumed by the timeline
//! and the write side ([`SessionKeyStore`]) used when keys are imported.
//!
//! # Implementations
//!
//! - [`MemorySessionStore`]: `HashMap` behind a mutex, for tests and one-shot
//!   tools
//! - [`RedbSessionStore`]: Durable, survives restarts
//! - [`ChaoticSessionStore`]: Wraps another store and injects failures
//!
//! Key files exported by other clients are loaded with [`import_session_keys`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chaotic;
mod keys;
mod memory;
mod redb;

use backscroll_crypto::ExportedSessionKey;
pub use backscroll_timeline::{MegolmSessionIndex, SessionStore, StorageError};
pub use chaotic::ChaoticSessionStore;
pub use keys::{KeyImportError, SessionKeyRecord, export_session_keys, import_session_keys};
pub use memory::MemorySessionStore;

pub use self::redb::RedbSessionStore;

/// Write side of a session store.
///
/// Implementations share state internally, so `&self` is enough to add a
/// session and a clone sees the same sessions.
pub trait SessionKeyStore: SessionStore {
    /// Store (or replace) the session for `index`.
    ///
    /// A replacement only happens when the new export starts at an earlier
    /// message index than the stored one; otherwise the call is a no-op and
    /// returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the backend fails.
    fn save_inbound_session(
        &self,
        index: &MegolmSessionIndex,
        export: &ExportedSessionKey,
    ) -> Result<bool, StorageError>;

    /// Every stored session with its exported key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` or `StorageError::Corrupted` if the backend
    /// cannot be read.
    fn sessions(&self) -> Result<Vec<(MegolmSessionIndex, ExportedSessionKey)>, StorageError>;
}

/// Whether `candidate` should replace `existing` for the same index.
///
/// An export reaching further back in the ratchet decrypts strictly more
/// messages.
pub(crate) fn is_better_export(
    existing: Option<&ExportedSessionKey>,
    candidate: &ExportedSessionKey,
) -> bool {
    existing.is_none_or(|existing| candidate.message_index() < existing.message_index())
}

/// Log target shared with the timeline for session store traffic.
pub(crate) const LOG_DB: &str = "backscroll::db";
