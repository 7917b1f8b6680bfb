//! Decrypt-on-read for `m.room.encrypted` events.
//!
//! Encrypted events are stored exactly as received. Whenever a row is read the
//! pipeline looks up the inbound group session, decrypts, and parses the
//! plaintext into an ordinary event. Any failure yields a notice placeholder
//! with the original envelope, so a row always has something to show.
//!
//! ```text
//!  session exists? ──no──► NoSession
//!        │ err ──────────► StorageCheck
//!       yes
//!        ▼
//!  load session ──err────► StorageRetrieve
//!        ▼
//!  decrypt ──err─────────► Crypto(message)
//!        ▼
//!  parse plaintext ──────► MalformedPlaintext (not exactly one known event)
//!        ▼
//!  event with envelope id, sender, timestamp, unsigned
//! ```

use std::{collections::HashMap, sync::Arc};

use backscroll_crypto::InboundGroupSession;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    LOG_CRYPTO, LOG_DB,
    config::PlaceholderTexts,
    error::{CryptoError, StorageError},
    event::{EncryptedContent, EventContent, RoomEvent, inject_envelope, parse_timeline_event},
};

/// Key identifying one inbound group session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MegolmSessionIndex {
    /// Room the session was shared in
    pub room_id: String,
    /// Group session id
    pub session_id: String,
    /// Curve25519 key of the sending device
    pub sender_key: String,
}

impl MegolmSessionIndex {
    /// Create an index from its parts.
    pub fn new(
        room_id: impl Into<String>,
        session_id: impl Into<String>,
        sender_key: impl Into<String>,
    ) -> Self {
        Self { room_id: room_id.into(), session_id: session_id.into(), sender_key: sender_key.into() }
    }

    /// Index for an encrypted event in `envelope`'s room.
    pub fn for_event(envelope: &RoomEvent, content: &EncryptedContent) -> Self {
        Self::new(envelope.room_id(), content.session_id.clone(), content.sender_key.clone())
    }
}

/// Lookup of inbound group sessions.
pub trait SessionStore {
    /// Whether a session exists for `index`.
    fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError>;

    /// Load the session for `index`.
    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError>;
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError> {
        (**self).has_inbound_session(index)
    }

    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError> {
        (**self).inbound_session(index)
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError> {
        (**self).has_inbound_session(index)
    }

    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError> {
        (**self).inbound_session(index)
    }
}

/// Decrypts a group-message ciphertext with a loaded session.
pub trait GroupDecryptor {
    /// Decrypt `ciphertext` and return the plaintext bytes.
    fn decrypt_group_message(
        &self,
        session: &InboundGroupSession,
        ciphertext: &str,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// [`GroupDecryptor`] backed by `backscroll-crypto`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MegolmDecryptor;

impl GroupDecryptor for MegolmDecryptor {
    fn decrypt_group_message(
        &self,
        session: &InboundGroupSession,
        ciphertext: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(session.decrypt(ciphertext)?.plaintext)
    }
}

/// Why an encrypted event could not be shown in the clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionFailure {
    /// No inbound session for the event
    NoSession,
    /// Session store failed during the existence check
    StorageCheck,
    /// Session store failed while loading the session
    StorageRetrieve,
    /// Decryption primitive rejected the ciphertext
    Crypto(String),
    /// Plaintext is not exactly one supported event
    MalformedPlaintext,
}

impl DecryptionFailure {
    /// Placeholder body for this failure.
    pub fn placeholder_body(&self, texts: &PlaceholderTexts) -> String {
        match self {
            Self::NoSession => texts.no_keys.clone(),
            Self::StorageCheck => texts.storage_check.clone(),
            Self::StorageRetrieve => texts.storage_retrieve.clone(),
            Self::Crypto(message) => texts.crypto(message),
            Self::MalformedPlaintext => texts.unknown_event.clone(),
        }
    }
}

/// Outcome of resolving one encrypted event.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptionResult {
    /// The decrypted event, or a placeholder notice
    pub event: RoomEvent,
    /// Set when `event` is a placeholder
    pub failure: Option<DecryptionFailure>,
}

impl DecryptionResult {
    /// True if `event` is the decrypted payload.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Turns encrypted events into displayable ones.
///
/// Stateless apart from its collaborators; the same input and store contents
/// always give the same result.
#[derive(Debug, Clone)]
pub struct DecryptionPipeline<S, D = MegolmDecryptor> {
    sessions: S,
    decryptor: D,
    placeholders: PlaceholderTexts,
}

impl<S: SessionStore, D: GroupDecryptor> DecryptionPipeline<S, D> {
    /// Create a pipeline over the given collaborators.
    pub fn new(sessions: S, decryptor: D, placeholders: PlaceholderTexts) -> Self {
        Self { sessions, decryptor, placeholders }
    }

    /// The session store.
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Resolve `envelope`, whose content is `encrypted`.
    ///
    /// Never fails: errors become a placeholder notice carrying the
    /// envelope's id, sender and timestamp.
    pub fn decrypt(&self, envelope: &RoomEvent, encrypted: &EncryptedContent) -> DecryptionResult {
        match self.try_decrypt(envelope, encrypted) {
            Ok(event) => DecryptionResult { event, failure: None },
            Err(failure) => DecryptionResult {
                event: RoomEvent::placeholder(envelope, failure.placeholder_body(&self.placeholders)),
                failure: Some(failure),
            },
        }
    }

    fn try_decrypt(
        &self,
        envelope: &RoomEvent,
        encrypted: &EncryptedContent,
    ) -> Result<RoomEvent, DecryptionFailure> {
        let index = MegolmSessionIndex::for_event(envelope, encrypted);

        match self.sessions.has_inbound_session(&index) {
            Ok(true) => {},
            Ok(false) => {
                tracing::info!(
                    target: LOG_CRYPTO,
                    room_id = %index.room_id,
                    session_id = %index.session_id,
                    sender_key = %index.sender_key,
                    event_id = envelope.event_id(),
                    "Could not find inbound megolm session"
                );
                return Err(DecryptionFailure::NoSession);
            },
            Err(error) => {
                tracing::error!(
                    target: LOG_DB,
                    event_id = envelope.event_id(),
                    %error,
                    "failed to check megolm session's existence"
                );
                return Err(DecryptionFailure::StorageCheck);
            },
        }

        let session = self.sessions.inbound_session(&index).map_err(|error| {
            tracing::error!(
                target: LOG_DB,
                event_id = envelope.event_id(),
                session_id = %index.session_id,
                %error,
                "failed to retrieve megolm session"
            );
            DecryptionFailure::StorageRetrieve
        })?;

        let plaintext = self
            .decryptor
            .decrypt_group_message(&session, &encrypted.ciphertext)
            .map_err(|error| {
                tracing::error!(
                    target: LOG_CRYPTO,
                    event_id = envelope.event_id(),
                    %error,
                    "failed to decrypt message"
                );
                DecryptionFailure::Crypto(error.to_string())
            })?;

        let event = parse_plaintext(&plaintext, envelope)?;
        tracing::debug!(
            target: LOG_CRYPTO,
            event_id = envelope.event_id(),
            event_type = event.event_type(),
            "decrypted event"
        );
        Ok(event)
    }
}

fn parse_plaintext(plaintext: &[u8], envelope: &RoomEvent) -> Result<RoomEvent, DecryptionFailure> {
    let malformed = |reason: &dyn std::fmt::Display| {
        tracing::warn!(
            target: LOG_CRYPTO,
            event_id = envelope.event_id(),
            %reason,
            "decrypted payload is not a timeline event"
        );
        DecryptionFailure::MalformedPlaintext
    };

    let mut document: Value = serde_json::from_slice(plaintext).map_err(|e| malformed(&e))?;
    let Value::Object(object) = &mut document else {
        return Err(malformed(&"payload is not a JSON object"));
    };
    inject_envelope(object, envelope);

    let event = parse_timeline_event(document, envelope.room_id()).map_err(|e| malformed(&e))?;
    match event.content() {
        EventContent::Unsupported { event_type } => Err(malformed(&format!("unsupported type {event_type}"))),
        EventContent::Encrypted(_) => Err(malformed(&"nested encrypted payload")),
        _ => Ok(event),
    }
}

/// Decryption results cached by event id.
///
/// Each entry remembers the session it was resolved under so newly arrived
/// keys can invalidate exactly the affected events.
#[derive(Debug, Default, Clone)]
pub struct DecryptionCache {
    entries: HashMap<String, (MegolmSessionIndex, DecryptionResult)>,
}

impl DecryptionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `event_id`.
    pub fn get(&self, event_id: &str) -> Option<&DecryptionResult> {
        self.entries.get(event_id).map(|(_, result)| result)
    }

    /// Remember `result` for `event_id`.
    pub fn insert(&mut self, event_id: String, index: MegolmSessionIndex, result: DecryptionResult) {
        self.entries.insert(event_id, (index, result));
    }

    /// Drop every entry resolved under `index`. Returns how many were removed.
    pub fn invalidate(&mut self, index: &MegolmSessionIndex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (cached, _)| cached != index);
        before - self.entries.len()
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
