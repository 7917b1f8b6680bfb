//! Error types for the timeline core.
//!
//! Split by boundary: store lookups, session storage, the group-decrypt
//! primitive, the `/messages` transport, and raw event parsing. Only
//! [`TimelineError`] and [`ParseError`] ever reach callers of the timeline;
//! storage and crypto errors stop at the decryption pipeline, transport errors
//! stop at the pagination controller.

use backscroll_crypto::GroupSessionError;
use thiserror::Error;

/// Errors returned by timeline lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// Event id referenced but absent from the store
    #[error("event not found: {event_id}")]
    NotFound {
        /// The missing event id
        event_id: String,
    },

    /// Row index past the end of the timeline
    #[error("row {row} out of range (len {len})")]
    RowOutOfRange {
        /// Requested row
        row: usize,
        /// Number of rows
        len: usize,
    },

    /// Event could not be serialized for display
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Errors from the session-store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored record could not be decoded
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// Session disappeared between the existence check and retrieval
    #[error("inbound session {session_id} missing")]
    MissingSession {
        /// Session that was expected to exist
        session_id: String,
    },
}

/// Errors from the group-decrypt collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The group-session primitive rejected the ciphertext
    #[error(transparent)]
    GroupSession(#[from] GroupSessionError),
}

/// A failed `/messages` request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{errcode}: {message}")]
pub struct TransportError {
    /// Server error code (`M_FORBIDDEN`, `M_LIMIT_EXCEEDED`, ...)
    pub errcode: String,
    /// Human-readable error message
    pub message: String,
}

impl TransportError {
    /// Create a transport error from a code and message.
    pub fn new(errcode: impl Into<String>, message: impl Into<String>) -> Self {
        Self { errcode: errcode.into(), message: message.into() }
    }
}

/// A raw JSON document that does not describe a timeline event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Top-level value is not a JSON object
    #[error("event is not a JSON object")]
    NotAnObject,

    /// Envelope fields missing or mistyped
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Content does not match the declared event type
    #[error("invalid content for {event_type}: {reason}")]
    InvalidContent {
        /// Declared `type`
        event_type: String,
        /// What went wrong
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display_carries_code_and_message() {
        let err = TransportError::new("M_FORBIDDEN", "You are not in this room");
        assert_eq!(err.to_string(), "M_FORBIDDEN: You are not in this room");
    }

    #[test]
    fn crypto_error_forwards_primitive_message() {
        let err = CryptoError::from(GroupSessionError::DecryptionFailed {
            reason: "authentication failed".to_string(),
        });
        assert_eq!(err.to_string(), "decryption failed: authentication failed");
    }
}
