//! Timeline
//!
//! Room event timeline with bidirectional loading and on-demand decryption.
//! Live events are appended as they sync, older history is paginated in at
//! the head, and encrypted events are stored as received and decrypted each
//! time a row is read.
//!
//! # Architecture
//!
//! The timeline is Sans-IO. It never talks to the network or blocks on
//! storage of its own: backward pagination returns a [`FetchRequest`] for the
//! caller to execute with a [`MessagesTransport`], and the response is fed
//! back through [`Timeline::apply_messages`]. Session lookup and decryption
//! go through the [`SessionStore`] and [`GroupDecryptor`] traits.
//!
//! # Components
//!
//! - [`EventStore`]: Ordered, deduplicated event storage
//! - [`PaginationController`]: Single-flight backward pagination
//! - [`DecryptionPipeline`]: Encrypted event to plaintext event or placeholder
//! - [`projection`]: Row attributes (sections, bodies, media dimensions)
//! - [`Timeline`]: Ties the above together for one room

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod decryption;
mod error;
mod event;
mod pagination;
mod profile;
pub mod projection;
mod store;
mod timeline;
mod transport;

pub use config::{PlaceholderTexts, TimelineConfig};
pub use decryption::{
    DecryptionCache, DecryptionFailure, DecryptionPipeline, DecryptionResult, GroupDecryptor,
    MegolmDecryptor, MegolmSessionIndex, SessionStore,
};
pub use error::{CryptoError, ParseError, StorageError, TimelineError, TransportError};
pub use event::{
    AvatarContent, CanonicalAliasContent, EncryptedContent, EventContent, MediaContent, MediaInfo,
    MemberContent, MessageContent, NameContent, RedactionContent, RoomEvent, TextContent,
    TombstoneContent, TopicContent, parse_timeline_event, parse_timeline_events,
};
pub use pagination::{FetchRequest, PaginationController, PaginationOutcome, PaginationState};
pub use profile::{MemberProfiles, ProfileResolver};
pub use projection::{EventKind, Role, RowValue, TimelineRow};
pub use store::{EventStore, InsertedRange};
pub use timeline::{SyncState, Timeline, TimelineObserver};
pub use transport::{MessagesBatch, MessagesTransport, SyncBatch};

/// Pagination progress and UI-facing events.
pub(crate) const LOG_UI: &str = "backscroll::ui";
/// `/messages` failures.
pub(crate) const LOG_NET: &str = "backscroll::net";
/// Session lookup misses and decryption outcomes.
pub(crate) const LOG_CRYPTO: &str = "backscroll::crypto";
/// Session store failures.
pub(crate) const LOG_DB: &str = "backscroll::db";
