//! Hash ratchet for per-message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: a ratchet at index `n` cannot produce keys for `< n`
//! - Key Uniqueness: each index produces a unique message key
//! - Determinism: same chain key and index always produce the same sequence

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::GroupSessionError;

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving the next chain key
const CHAIN_LABEL: &[u8] = b"chain";

/// Label for deriving a message key
const MESSAGE_LABEL: &[u8] = b"message";

/// Maximum number of indices to skip in one derivation.
///
/// Inbound sessions derive forward from their first known index on every
/// decrypt, so this bounds the hashing done per read.
pub(crate) const MAX_SKIP: u32 = 10_000;

/// A message key derived from the ratchet.
///
/// Used for a single message encryption/decryption, then dropped.
#[derive(Clone)]
pub struct MessageKey {
    /// The 32-byte symmetric key for XChaCha20-Poly1305
    key: [u8; 32],
    /// The message index this key belongs to
    index: u32,
}

impl MessageKey {
    /// 32-byte symmetric key for XChaCha20-Poly1305 AEAD.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Message index this key was derived for.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Forward-only hash ratchet.
///
/// Each [`advance()`](Self::advance) call derives the message key for the
/// current index, replaces the chain key with its successor and increments
/// the index. [`key_at()`](Self::key_at) does the same on a scratch copy,
/// leaving `self` untouched.
#[derive(Clone)]
pub struct HashRatchet {
    /// Chain key at `index`
    chain_key: [u8; 32],
    /// Message index the chain key belongs to
    index: u32,
}

impl HashRatchet {
    /// Create a ratchet positioned at `index` with the given chain key.
    pub fn new(chain_key: &[u8; 32], index: u32) -> Self {
        Self { chain_key: *chain_key, index }
    }

    /// Current message index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Chain key at the current index.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Derive the key for the current index and move to the next one.
    pub fn advance(&mut self) -> Result<MessageKey, GroupSessionError> {
        if self.index == u32::MAX {
            return Err(GroupSessionError::IndexOverflow { current: self.index });
        }

        let message_key = self.derive_message_key();
        let next_chain_key = self.derive_next_chain_key();

        self.chain_key.zeroize();
        self.chain_key = next_chain_key;

        let current = self.index;
        self.index += 1;

        Ok(MessageKey { key: message_key, index: current })
    }

    /// Derive the key for `target` without moving this ratchet.
    ///
    /// # Errors
    ///
    /// - `UnknownMessageIndex` if `target` is before the current index
    /// - `MessageIndexTooFarAhead` if reaching `target` needs more than
    ///   [`MAX_SKIP`] steps
    pub fn key_at(&self, target: u32) -> Result<MessageKey, GroupSessionError> {
        if target < self.index {
            return Err(GroupSessionError::UnknownMessageIndex {
                first_known: self.index,
                requested: target,
            });
        }

        if target - self.index > MAX_SKIP {
            return Err(GroupSessionError::MessageIndexTooFarAhead {
                current: self.index,
                requested: target,
                max_skip: MAX_SKIP,
            });
        }

        let mut scratch = self.clone();
        while scratch.index < target {
            let _ = scratch.advance()?;
        }
        scratch.advance()
    }

    fn derive_message_key(&self) -> [u8; 32] {
        self.hmac(MESSAGE_LABEL)
    }

    fn derive_next_chain_key(&self) -> [u8; 32] {
        self.hmac(CHAIN_LABEL)
    }

    fn hmac(&self, label: &[u8]) -> [u8; 32] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.chain_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(label);
        let result = mac.finalize().into_bytes();

        let mut key = [0u8; 32];
        key.copy_from_slice(&result);
        key
    }
}

impl Drop for HashRatchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}
