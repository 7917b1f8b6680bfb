//! Row attributes derived from events.
//!
//! Everything here is a pure function of an already-resolved event (and, for
//! sections, its stored predecessors). The timeline decides which event a row
//! resolves to; this module decides what the UI sees for it.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::{
    decryption::DecryptionFailure,
    event::{EventContent, MediaContent, MessageContent, RoomEvent},
    store::EventStore,
};

/// Width or height of an event that carries no dimensions.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

const REPLY_OPEN: &str = "<mx-reply>";
const REPLY_CLOSE: &str = "</mx-reply>";

/// Attributes a row exposes to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Grouping label for consecutive same-sender, same-day rows
    Section,
    /// [`EventKind`] of the row
    Type,
    /// Plain-text body
    Body,
    /// Rich-text body with reply quotes unwrapped
    FormattedBody,
    /// Sender user id
    UserId,
    /// Sender display name
    UserName,
    /// Server timestamp
    Timestamp,
    /// Media URL
    Url,
    /// Media height
    Height,
    /// Media width
    Width,
    /// Height divided by width
    ProportionalHeight,
    /// Event id
    Id,
}

impl Role {
    /// Every role, in display order.
    pub const ALL: [Role; 12] = [
        Role::Section,
        Role::Type,
        Role::Body,
        Role::FormattedBody,
        Role::UserId,
        Role::UserName,
        Role::Timestamp,
        Role::Url,
        Role::Height,
        Role::Width,
        Role::ProportionalHeight,
        Role::Id,
    ];

    /// Name the UI binds to.
    pub fn name(self) -> &'static str {
        match self {
            Role::Section => "section",
            Role::Type => "type",
            Role::Body => "body",
            Role::FormattedBody => "formattedBody",
            Role::UserId => "userId",
            Role::UserName => "userName",
            Role::Timestamp => "timestamp",
            Role::Url => "url",
            Role::Height => "height",
            Role::Width => "width",
            Role::ProportionalHeight => "proportionalHeight",
            Role::Id => "id",
        }
    }

    /// Inverse of [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }
}

/// Display category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EventKind {
    KeyRequest,
    Aliases,
    Avatar,
    CanonicalAlias,
    Create,
    Encrypted,
    Encryption,
    GuestAccess,
    HistoryVisibility,
    JoinRules,
    Member,
    Name,
    PowerLevels,
    Topic,
    Tombstone,
    Redaction,
    PinnedEvents,
    Sticker,
    Tag,
    Unsupported,
    UnknownMessage,
    AudioMessage,
    EmoteMessage,
    FileMessage,
    ImageMessage,
    NoticeMessage,
    TextMessage,
    VideoMessage,
}

impl EventKind {
    /// Classify an event.
    pub fn of(event: &RoomEvent) -> EventKind {
        match event.content() {
            EventContent::Message(message) => match message {
                MessageContent::Text(_) => EventKind::TextMessage,
                MessageContent::Emote(_) => EventKind::EmoteMessage,
                MessageContent::Notice(_) => EventKind::NoticeMessage,
                MessageContent::Image(_) => EventKind::ImageMessage,
                MessageContent::Video(_) => EventKind::VideoMessage,
                MessageContent::Audio(_) => EventKind::AudioMessage,
                MessageContent::File(_) => EventKind::FileMessage,
                MessageContent::Unknown { .. } => EventKind::UnknownMessage,
            },
            EventContent::Sticker(_) => EventKind::Sticker,
            EventContent::Encrypted(_) => EventKind::Encrypted,
            EventContent::Member { .. } => EventKind::Member,
            EventContent::Name(_) => EventKind::Name,
            EventContent::Topic(_) => EventKind::Topic,
            EventContent::Avatar(_) => EventKind::Avatar,
            EventContent::CanonicalAlias(_) => EventKind::CanonicalAlias,
            EventContent::Tombstone(_) => EventKind::Tombstone,
            EventContent::Redaction(_) => EventKind::Redaction,
            EventContent::Aliases(_) => EventKind::Aliases,
            EventContent::Create(_) => EventKind::Create,
            EventContent::Encryption(_) => EventKind::Encryption,
            EventContent::GuestAccess(_) => EventKind::GuestAccess,
            EventContent::HistoryVisibility(_) => EventKind::HistoryVisibility,
            EventContent::JoinRules(_) => EventKind::JoinRules,
            EventContent::PowerLevels(_) => EventKind::PowerLevels,
            EventContent::PinnedEvents(_) => EventKind::PinnedEvents,
            EventContent::Tag(_) => EventKind::Tag,
            EventContent::RoomKeyRequest(_) => EventKind::KeyRequest,
            EventContent::Unsupported { .. } => EventKind::Unsupported,
        }
    }
}

/// A role's value.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// Strings: ids, bodies, names, URLs, sections
    Text(String),
    /// [`Role::Type`]
    Kind(EventKind),
    /// [`Role::Timestamp`]
    Timestamp(DateTime<Utc>),
    /// [`Role::Width`] and [`Role::Height`]; [`UNKNOWN_SIZE`] when absent
    Size(u64),
    /// [`Role::ProportionalHeight`]
    Ratio(f64),
}

/// Every role of one row, projected at once.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow {
    /// Event id
    pub id: String,
    /// Section label
    pub section: String,
    /// Display category
    pub kind: EventKind,
    /// Plain-text body
    pub body: String,
    /// Rich-text body with reply quotes unwrapped
    pub formatted_body: String,
    /// Sender user id
    pub user_id: String,
    /// Sender display name
    pub user_name: String,
    /// Server timestamp
    pub timestamp: DateTime<Utc>,
    /// Media URL, empty if none
    pub url: String,
    /// Media width or [`UNKNOWN_SIZE`]
    pub width: u64,
    /// Media height or [`UNKNOWN_SIZE`]
    pub height: u64,
    /// `height / max(width, 1)`
    pub proportional_height: f64,
    /// Why the row shows a placeholder, if it does
    pub decryption_failure: Option<DecryptionFailure>,
}

/// Plain-text body, empty for events without one.
pub fn body(event: &RoomEvent) -> String {
    match event.content() {
        EventContent::Message(message) => message.body().to_string(),
        EventContent::Sticker(sticker) => sticker.body.clone(),
        _ => String::new(),
    }
}

/// Rich-text body for text-like messages.
///
/// Falls back to the plain body when no formatted body is present. Empty for
/// other events.
pub fn formatted_body(event: &RoomEvent) -> String {
    let EventContent::Message(
        MessageContent::Text(text) | MessageContent::Emote(text) | MessageContent::Notice(text),
    ) = event.content()
    else {
        return String::new();
    };

    match text.formatted_body.as_deref() {
        Some(formatted) if !formatted.is_empty() => strip_reply_markers(formatted),
        _ => text.body.clone(),
    }
}

/// Remove the first `<mx-reply>` and the first `</mx-reply>` tag.
///
/// Only the tags go; the quoted content between them stays.
pub fn strip_reply_markers(formatted: &str) -> String {
    let mut out = formatted.to_string();
    if let Some(pos) = out.find(REPLY_OPEN) {
        out.replace_range(pos..pos + REPLY_OPEN.len(), "");
    }
    if let Some(pos) = out.find(REPLY_CLOSE) {
        out.replace_range(pos..pos + REPLY_CLOSE.len(), "");
    }
    out
}

/// Media URL, empty unless the event carries one.
pub fn url(event: &RoomEvent) -> String {
    media(event).and_then(|m| m.url.clone()).unwrap_or_default()
}

/// Media width. [`UNKNOWN_SIZE`] for events without dimensions.
pub fn width(event: &RoomEvent) -> u64 {
    match dimensioned(event) {
        Some(media) => media.info.as_ref().and_then(|i| i.w).unwrap_or(0),
        None => UNKNOWN_SIZE,
    }
}

/// Media height. [`UNKNOWN_SIZE`] for events without dimensions.
pub fn height(event: &RoomEvent) -> u64 {
    match dimensioned(event) {
        Some(media) => media.info.as_ref().and_then(|i| i.h).unwrap_or(0),
        None => UNKNOWN_SIZE,
    }
}

/// `height / max(width, 1)`.
#[allow(clippy::cast_precision_loss)]
pub fn proportional_height(event: &RoomEvent) -> f64 {
    height(event) as f64 / width(event).max(1) as f64
}

/// Server timestamp as a UTC date-time. Out-of-range values map to the epoch.
pub fn timestamp(event: &RoomEvent) -> DateTime<Utc> {
    i64::try_from(event.origin_server_ts())
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}

fn media(event: &RoomEvent) -> Option<&MediaContent> {
    match event.content() {
        EventContent::Message(
            MessageContent::Image(m)
            | MessageContent::Video(m)
            | MessageContent::Audio(m)
            | MessageContent::File(m),
        )
        | EventContent::Sticker(m) => Some(m),
        _ => None,
    }
}

fn dimensioned(event: &RoomEvent) -> Option<&MediaContent> {
    match event.content() {
        EventContent::Message(MessageContent::Image(m) | MessageContent::Video(m))
        | EventContent::Sticker(m) => Some(m),
        _ => None,
    }
}

/// Calendar day of `ts_ms` at `offset`.
pub fn local_day(ts_ms: u64, offset: FixedOffset) -> NaiveDate {
    i64::try_from(ts_ms)
        .ok()
        .and_then(|ms| offset.timestamp_millis_opt(ms).single())
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Milliseconds since the epoch of midnight starting `day` at `offset`.
pub fn day_start_ms(day: NaiveDate, offset: FixedOffset) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(offset).single())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_default()
}

/// Section label for `row`.
///
/// Walks back over predecessors while they share the row's sender and day,
/// stopping before row 0, which is never compared. If the walk reaches an
/// event from an earlier day before a different sender, the label carries
/// the day start (`"{sender} {day_ms}"`) so a day break also breaks the
/// section; otherwise it is just `"{sender}"`.
///
/// Predecessors are read from the store without decrypting; encrypted
/// envelopes carry the same sender and timestamp as their plaintext.
pub fn section_key(store: &EventStore, row: usize, offset: FixedOffset) -> Option<String> {
    let event = store.event_at(row)?;
    let sender = event.sender();
    let day = local_day(event.origin_server_ts(), offset);

    for prev_row in (1..row).rev() {
        let Some(prev) = store.event_at(prev_row) else {
            break;
        };
        if local_day(prev.origin_server_ts(), offset) != day {
            return Some(format!("{sender} {}", day_start_ms(day, offset)));
        }
        if prev.sender() != sender {
            break;
        }
    }

    Some(sender.to_string())
}

/// Long-form date separator: `Monday, March 4, 2024`.
///
/// The year is left out for dates in `today`'s year.
pub fn format_date_separator(date: NaiveDate, today: NaiveDate) -> String {
    if date.format("%Y").to_string() == today.format("%Y").to_string() {
        date.format("%A, %B %-d").to_string()
    } else {
        date.format("%A, %B %-d, %Y").to_string()
    }
}
