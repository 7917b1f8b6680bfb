//! Chain key and session id derivation using HKDF and SHA-256

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

/// Label used for initial chain key derivation
const CHAIN_KEY_LABEL: &[u8] = b"backscrollGroupChainV1";

/// Label used for session id derivation
const SESSION_ID_LABEL: &[u8] = b"backscrollGroupSessionIdV1";

/// Derive the index-0 chain key from a session key.
///
/// # Security
///
/// - Deterministic: same session key always produces the same chain key
/// - The session key itself never enters the ratchet directly
pub fn derive_chain_key(session_key: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, session_key);

    let mut chain_key = [0u8; 32];
    let Ok(()) = hkdf.expand(CHAIN_KEY_LABEL, &mut chain_key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    chain_key
}

/// Derive the public session id for a session key.
///
/// Unpadded base64 of `SHA-256(label || session_key)`. Safe to publish: it
/// identifies the session without revealing key material.
pub fn derive_session_id(session_key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SESSION_ID_LABEL);
    hasher.update(session_key);
    STANDARD_NO_PAD.encode(hasher.finalize())
}
