//! Fuzz target for group message decryption
//!
//! Hands arbitrary strings to an inbound session as ciphertext.
//!
//! # Invariants
//!
//! - Decryption NEVER panics; garbage is `Err`
//! - Decryption never mutates the session: a genuine ciphertext still
//!   decrypts after any number of failed attempts

#![no_main]

use backscroll_crypto::{InboundGroupSession, NONCE_RANDOM_SIZE, OutboundGroupSession};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut outbound = OutboundGroupSession::new(&[0x5C; 32]);
    let inbound = InboundGroupSession::import(&outbound.export());
    let Ok(genuine) = outbound.encrypt(b"canary", [0; NONCE_RANDOM_SIZE]) else {
        return;
    };

    let input = String::from_utf8_lossy(data);
    let _ = inbound.decrypt(&input);

    let Ok(decrypted) = inbound.decrypt(&genuine) else {
        panic!("genuine ciphertext rejected after fuzz input");
    };
    assert_eq!(decrypted.plaintext, b"canary");
});
