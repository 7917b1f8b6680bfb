//! Error types for group session operations.

use thiserror::Error;

/// Errors produced while encrypting or decrypting group messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupSessionError {
    /// Message index precedes the first index this session can decrypt.
    #[error("unknown message index {requested}: session starts at {first_known}")]
    UnknownMessageIndex {
        /// First index the session holds keys for
        first_known: u32,
        /// Index carried by the message
        requested: u32,
    },

    /// Message index is further ahead than we are willing to ratchet.
    #[error("message index {requested} too far ahead of {current} (max skip {max_skip})")]
    MessageIndexTooFarAhead {
        /// Ratchet position the derivation starts from
        current: u32,
        /// Index carried by the message
        requested: u32,
        /// Maximum permitted skip
        max_skip: u32,
    },

    /// Authentication failed (wrong key, wrong session, or tampering).
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong
        reason: String,
    },

    /// Ciphertext could not be decoded into a group message.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// What went wrong
        reason: String,
    },

    /// Exported key material is malformed.
    #[error("invalid session key: {reason}")]
    InvalidSessionKey {
        /// What went wrong
        reason: String,
    },

    /// Ratchet index would overflow (2^32 messages in one session).
    #[error("message index overflow at {current}")]
    IndexOverflow {
        /// Index at which overflow was detected
        current: u32,
    },
}
