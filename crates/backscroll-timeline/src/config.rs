//! Timeline configuration.

use chrono::FixedOffset;

use crate::LOG_UI;

/// Per-timeline settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Offset from UTC, in seconds, used to decide which day an event falls
    /// on (section grouping, date separators).
    pub utc_offset_secs: i32,
    /// Cache decryption results by event id instead of decrypting on every
    /// read.
    pub memoize_decryption: bool,
    /// Bodies shown in place of events that could not be decrypted.
    pub placeholders: PlaceholderTexts,
}

impl TimelineConfig {
    /// The configured offset. Out-of-range values fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| {
            tracing::warn!(target: LOG_UI, offset = self.utc_offset_secs, "utc offset out of range, using UTC");
            utc()
        })
    }
}

/// The zero offset.
pub(crate) fn utc() -> FixedOffset {
    let Some(offset) = FixedOffset::east_opt(0) else {
        unreachable!("zero is always a valid offset");
    };
    offset
}

/// User-visible placeholder bodies for undecryptable events.
///
/// `crypto_error` may contain `%1`, replaced with the primitive's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderTexts {
    /// No inbound session for the event
    pub no_keys: String,
    /// Session store failed while checking for the session
    pub storage_check: String,
    /// Session store failed while loading the session
    pub storage_retrieve: String,
    /// Decryption primitive rejected the ciphertext
    pub crypto_error: String,
    /// Plaintext did not describe a supported event
    pub unknown_event: String,
}

impl Default for PlaceholderTexts {
    fn default() -> Self {
        Self {
            no_keys: "-- Encrypted Event (No keys found for decryption) --".to_string(),
            storage_check: "-- Decryption Error (failed to communicate with DB) --".to_string(),
            storage_retrieve: "-- Decryption Error (failed to retrieve megolm keys from db) --"
                .to_string(),
            crypto_error: "-- Decryption Error (%1) --".to_string(),
            unknown_event: "-- Encrypted Event (Unknown event type) --".to_string(),
        }
    }
}

impl PlaceholderTexts {
    /// Crypto placeholder with the underlying message substituted.
    pub fn crypto(&self, message: &str) -> String {
        self.crypto_error.replace("%1", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_placeholder_embeds_message() {
        let texts = PlaceholderTexts::default();
        assert_eq!(texts.crypto("bad mac"), "-- Decryption Error (bad mac) --");
    }

    #[test]
    fn default_config_is_utc_without_memoization() {
        let config = TimelineConfig::default();
        assert_eq!(config.utc_offset_secs, 0);
        assert!(!config.memoize_decryption);
        assert_eq!(config.placeholders, PlaceholderTexts::default());
    }

    #[test]
    fn invalid_offset_falls_back_to_utc() {
        let config = TimelineConfig { utc_offset_secs: 90_000, ..TimelineConfig::default() };
        assert_eq!(config.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn offset_is_applied() {
        let config = TimelineConfig { utc_offset_secs: 3_600, ..TimelineConfig::default() };
        assert_eq!(config.utc_offset().local_minus_utc(), 3_600);
    }
}
