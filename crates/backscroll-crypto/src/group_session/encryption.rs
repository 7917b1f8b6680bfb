//! Group message encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - random bytes must be provided by the caller.
//!
//! Wire format (then base64, unpadded):
//!
//! ```text
//! ┌───────────────┬────────────┬──────────────────────────┐
//! │ index (4, BE) │ nonce (24) │ ciphertext + tag (16)    │
//! └───────────────┴────────────┴──────────────────────────┘
//! ```

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use super::{error::GroupSessionError, ratchet::MessageKey};

/// Size of the random suffix in the nonce (20 bytes)
pub const NONCE_RANDOM_SIZE: usize = 20;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// `XChaCha20` nonce size (24 bytes)
const NONCE_SIZE: usize = 24;

/// Encoded header size: index + nonce
const HEADER_SIZE: usize = 4 + NONCE_SIZE;

/// An encrypted group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    /// Ratchet index of the key that encrypted this message
    pub message_index: u32,
    /// The 24-byte `XChaCha20` nonce
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
}

impl GroupMessage {
    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(POLY1305_TAG_SIZE)
    }

    /// Encode as unpadded base64, the form carried in event content.
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.message_index.to_be_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD_NO_PAD.encode(bytes)
    }

    /// Decode from unpadded base64.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` if the input is not base64 or is shorter than the
    ///   header plus authentication tag
    pub fn decode(encoded: &str) -> Result<Self, GroupSessionError> {
        let bytes = STANDARD_NO_PAD.decode(encoded.trim_end_matches('=')).map_err(|e| {
            GroupSessionError::InvalidMessage { reason: format!("bad base64: {e}") }
        })?;

        if bytes.len() < HEADER_SIZE + POLY1305_TAG_SIZE {
            return Err(GroupSessionError::InvalidMessage {
                reason: format!(
                    "message too short: {} bytes, need at least {}",
                    bytes.len(),
                    HEADER_SIZE + POLY1305_TAG_SIZE
                ),
            });
        }

        let mut index = [0u8; 4];
        index.copy_from_slice(&bytes[0..4]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[4..HEADER_SIZE]);

        Ok(Self {
            message_index: u32::from_be_bytes(index),
            nonce,
            ciphertext: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

/// Encrypt a message using `XChaCha20-Poly1305`.
///
/// The session id is bound as associated data.
///
/// # Security
///
/// - Nonce is unique per (index, random)
/// - Caller MUST provide cryptographically secure random bytes in production
pub fn encrypt_message(
    plaintext: &[u8],
    message_key: &MessageKey,
    session_id: &str,
    random_suffix: [u8; NONCE_RANDOM_SIZE],
) -> GroupMessage {
    let nonce = build_nonce(message_key.index(), random_suffix);
    let cipher = XChaCha20Poly1305::new(message_key.key().into());

    let payload = Payload { msg: plaintext, aad: session_id.as_bytes() };
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    GroupMessage { message_index: message_key.index(), nonce, ciphertext }
}

/// Decrypt a message using `XChaCha20-Poly1305`.
///
/// # Errors
///
/// - `DecryptionFailed`: key index mismatch, wrong session, or tampering
pub fn decrypt_message(
    message: &GroupMessage,
    message_key: &MessageKey,
    session_id: &str,
) -> Result<Vec<u8>, GroupSessionError> {
    if message_key.index() != message.message_index {
        return Err(GroupSessionError::DecryptionFailed {
            reason: format!(
                "index mismatch: key is {}, message is {}",
                message_key.index(),
                message.message_index
            ),
        });
    }

    let cipher = XChaCha20Poly1305::new(message_key.key().into());
    let payload = Payload { msg: message.ciphertext.as_slice(), aad: session_id.as_bytes() };

    cipher.decrypt(XNonce::from_slice(&message.nonce), payload).map_err(|_| {
        GroupSessionError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

/// Build a 24-byte nonce for `XChaCha20`.
///
/// Structure:
/// - bytes 0-3: message index (big-endian)
/// - bytes 4-23: random suffix (caller-provided)
fn build_nonce(index: u32, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..4].copy_from_slice(&index.to_be_bytes());
    nonce[4..NONCE_SIZE].copy_from_slice(&random_suffix);
    nonce
}
