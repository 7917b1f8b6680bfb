//! Backscroll Cryptographic Primitives
//!
//! The group-session primitive used to decrypt room messages. Pure functions
//! with deterministic outputs; callers provide random bytes so tests stay
//! reproducible.
//!
//! # Key Lifecycle
//!
//! A sender creates an [`OutboundGroupSession`] from 32 random bytes (the
//! session key). Receivers get an [`ExportedSessionKey`] snapshot of the
//! ratchet at some message index and build an [`InboundGroupSession`] from it.
//!
//! ```text
//! Session Key
//!        │
//!        ▼
//! HKDF → Chain Key (index 0)
//!        │
//!        ▼
//! Hash Ratchet → Message Keys (one per message index)
//!        │
//!        ▼
//! AEAD Encryption → index || nonce || ciphertext (base64)
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - An inbound session only holds the chain key at its first known index;
//!   earlier message keys cannot be derived from it
//! - Message keys are zeroized immediately after single use
//!
//! Session Binding:
//! - The session id is bound into every ciphertext as associated data, so a
//!   message never decrypts under a different session that happens to share
//!   the index
//!
//! Repeatable Reads:
//! - [`InboundGroupSession::decrypt`] takes `&self`. Decrypting the same
//!   ciphertext twice yields the same plaintext, which timeline views rely on
//!   because they decrypt again on every read

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod group_session;

pub use group_session::{
    DecryptedMessage, ExportedSessionKey, GroupMessage, GroupSessionError, InboundGroupSession,
    MessageKey, NONCE_RANDOM_SIZE, OutboundGroupSession, SESSION_KEY_SIZE, derive_chain_key,
    derive_session_id,
};
