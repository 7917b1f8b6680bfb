//! Outbound and inbound group sessions.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use zeroize::Zeroize;

use super::{
    derivation::{derive_chain_key, derive_session_id},
    encryption::{GroupMessage, NONCE_RANDOM_SIZE, decrypt_message, encrypt_message},
    error::GroupSessionError,
    ratchet::HashRatchet,
};

/// Size of a session key in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// Encoded export size: index (4) + chain key (32).
const EXPORT_SIZE: usize = 4 + 32;

/// Ratchet snapshot handed to receivers.
///
/// Holds the chain key at `message_index`. Anyone holding it can decrypt
/// messages from that index onwards, never before.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportedSessionKey {
    session_id: String,
    message_index: u32,
    chain_key: [u8; 32],
}

impl ExportedSessionKey {
    /// Assemble an export from its parts (e.g. when loading from storage).
    pub fn new(session_id: impl Into<String>, message_index: u32, chain_key: [u8; 32]) -> Self {
        Self { session_id: session_id.into(), message_index, chain_key }
    }

    /// Session this key belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// First message index the key can decrypt.
    pub fn message_index(&self) -> u32 {
        self.message_index
    }

    /// Chain key at [`message_index`](Self::message_index).
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Encode index and chain key as unpadded base64.
    ///
    /// The session id travels separately (it is public).
    pub fn to_base64(&self) -> String {
        let mut bytes = [0u8; EXPORT_SIZE];
        bytes[0..4].copy_from_slice(&self.message_index.to_be_bytes());
        bytes[4..].copy_from_slice(&self.chain_key);
        let encoded = STANDARD_NO_PAD.encode(bytes);
        bytes.zeroize();
        encoded
    }

    /// Decode an export produced by [`to_base64`](Self::to_base64).
    ///
    /// # Errors
    ///
    /// - `InvalidSessionKey` if the input is not base64 or has the wrong size
    pub fn from_base64(
        session_id: impl Into<String>,
        encoded: &str,
    ) -> Result<Self, GroupSessionError> {
        let mut bytes = STANDARD_NO_PAD.decode(encoded.trim_end_matches('=')).map_err(|e| {
            GroupSessionError::InvalidSessionKey { reason: format!("bad base64: {e}") }
        })?;

        if bytes.len() != EXPORT_SIZE {
            let len = bytes.len();
            bytes.zeroize();
            return Err(GroupSessionError::InvalidSessionKey {
                reason: format!("expected {EXPORT_SIZE} bytes, got {len}"),
            });
        }

        let mut index = [0u8; 4];
        index.copy_from_slice(&bytes[0..4]);
        let mut chain_key = [0u8; 32];
        chain_key.copy_from_slice(&bytes[4..]);
        bytes.zeroize();

        Ok(Self::new(session_id, u32::from_be_bytes(index), chain_key))
    }
}

impl fmt::Debug for ExportedSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedSessionKey")
            .field("session_id", &self.session_id)
            .field("message_index", &self.message_index)
            .finish_non_exhaustive()
    }
}

impl Drop for ExportedSessionKey {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

/// A successfully decrypted group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Decrypted bytes
    pub plaintext: Vec<u8>,
    /// Ratchet index the message was encrypted at
    pub message_index: u32,
}

/// Sending side of a group session.
///
/// Owns the ratchet and advances it once per encrypted message.
pub struct OutboundGroupSession {
    session_id: String,
    ratchet: HashRatchet,
}

impl OutboundGroupSession {
    /// Create a session from fresh random key material.
    pub fn new(session_key: &[u8; SESSION_KEY_SIZE]) -> Self {
        let session_id = derive_session_id(session_key);
        let chain_key = derive_chain_key(session_key);
        Self { session_id, ratchet: HashRatchet::new(&chain_key, 0) }
    }

    /// Public session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Index the next message will be encrypted at.
    pub fn message_index(&self) -> u32 {
        self.ratchet.index()
    }

    /// Snapshot the ratchet for sharing with receivers.
    ///
    /// Receivers of this export can read messages from the current index on.
    pub fn export(&self) -> ExportedSessionKey {
        ExportedSessionKey::new(
            self.session_id.clone(),
            self.ratchet.index(),
            *self.ratchet.chain_key(),
        )
    }

    /// Encrypt a message and return its base64 wire form.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        random_suffix: [u8; NONCE_RANDOM_SIZE],
    ) -> Result<String, GroupSessionError> {
        let message_key = self.ratchet.advance()?;
        Ok(encrypt_message(plaintext, &message_key, &self.session_id, random_suffix).encode())
    }
}

/// Receiving side of a group session.
///
/// # Invariants
///
/// - Decryption never mutates the session; the same ciphertext decrypts
///   identically on every call
/// - Messages below `first_known_index` are rejected
#[derive(Clone)]
pub struct InboundGroupSession {
    session_id: String,
    ratchet: HashRatchet,
}

impl InboundGroupSession {
    /// Build from an exported ratchet snapshot.
    pub fn import(export: &ExportedSessionKey) -> Self {
        Self {
            session_id: export.session_id.clone(),
            ratchet: HashRatchet::new(&export.chain_key, export.message_index),
        }
    }

    /// Public session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// First message index this session can decrypt.
    pub fn first_known_index(&self) -> u32 {
        self.ratchet.index()
    }

    /// Export the snapshot this session was built from.
    pub fn export(&self) -> ExportedSessionKey {
        ExportedSessionKey::new(
            self.session_id.clone(),
            self.ratchet.index(),
            *self.ratchet.chain_key(),
        )
    }

    /// Decrypt a base64 group message.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` if the ciphertext cannot be decoded
    /// - `UnknownMessageIndex` if the message predates this session's keys
    /// - `MessageIndexTooFarAhead` if the index is implausibly far ahead
    /// - `DecryptionFailed` if authentication fails
    pub fn decrypt(&self, ciphertext: &str) -> Result<DecryptedMessage, GroupSessionError> {
        let message = GroupMessage::decode(ciphertext)?;
        let message_key = self.ratchet.key_at(message.message_index)?;
        let plaintext = decrypt_message(&message, &message_key, &self.session_id)?;

        Ok(DecryptedMessage { plaintext, message_index: message.message_index })
    }
}

impl fmt::Debug for InboundGroupSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundGroupSession")
            .field("session_id", &self.session_id)
            .field("first_known_index", &self.ratchet.index())
            .finish_non_exhaustive()
    }
}
