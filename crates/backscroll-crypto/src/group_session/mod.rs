//! Megolm-style group sessions.
//!
//! One sender ratchets a chain key forward once per message. Receivers hold a
//! snapshot of that chain key and can derive the key for any later message
//! index without consuming anything.

mod derivation;
mod encryption;
mod error;
mod ratchet;
mod session;

pub use derivation::{derive_chain_key, derive_session_id};
pub use encryption::{GroupMessage, NONCE_RANDOM_SIZE, decrypt_message, encrypt_message};
pub use error::GroupSessionError;
pub use ratchet::{HashRatchet, MessageKey};
pub use session::{
    DecryptedMessage, ExportedSessionKey, InboundGroupSession, OutboundGroupSession,
    SESSION_KEY_SIZE,
};
