//! Room events as delivered by sync and `/messages`.
//!
//! A [`RoomEvent`] is the common envelope (id, room, sender, timestamp,
//! unsigned data) plus one [`EventContent`] variant selected by the event's
//! `type`. Events are immutable once parsed; the raw JSON they came from is
//! kept alongside for display.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{LOG_NET, error::ParseError};

/// An immutable timeline event.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent {
    event_id: String,
    room_id: String,
    sender: String,
    origin_server_ts: u64,
    event_type: String,
    unsigned: Option<Value>,
    content: EventContent,
    source: Value,
}

impl RoomEvent {
    /// Server-assigned unique event id.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Room the event belongs to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// User id of the sender.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Server timestamp in milliseconds since the epoch.
    pub fn origin_server_ts(&self) -> u64 {
        self.origin_server_ts
    }

    /// The declared `type` string.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Server-attached unsigned data, if any.
    pub fn unsigned(&self) -> Option<&Value> {
        self.unsigned.as_ref()
    }

    /// Typed content.
    pub fn content(&self) -> &EventContent {
        &self.content
    }

    /// The JSON document this event was parsed from.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// True if the content is an undecrypted `m.room.encrypted` payload.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.content, EventContent::Encrypted(_))
    }

    /// A notice carrying `envelope`'s id, room, sender and timestamp with the
    /// given body. Used to stand in for events that cannot be decrypted.
    pub fn placeholder(envelope: &RoomEvent, body: impl Into<String>) -> Self {
        let body = body.into();
        let source = json!({
            "event_id": envelope.event_id,
            "room_id": envelope.room_id,
            "sender": envelope.sender,
            "origin_server_ts": envelope.origin_server_ts,
            "type": MESSAGE_TYPE,
            "content": { "msgtype": "m.notice", "body": body },
        });

        Self {
            event_id: envelope.event_id.clone(),
            room_id: envelope.room_id.clone(),
            sender: envelope.sender.clone(),
            origin_server_ts: envelope.origin_server_ts,
            event_type: MESSAGE_TYPE.to_string(),
            unsigned: None,
            content: EventContent::Message(MessageContent::Notice(TextContent {
                body,
                format: None,
                formatted_body: None,
            })),
            source,
        }
    }
}

const MESSAGE_TYPE: &str = "m.room.message";

/// Event content, one variant per recognised event type.
///
/// State events whose content the timeline never inspects keep their raw
/// JSON. Types outside this list parse as [`EventContent::Unsupported`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventContent {
    /// `m.room.message`
    Message(MessageContent),
    /// `m.sticker`
    Sticker(MediaContent),
    /// `m.room.encrypted`, not yet decrypted
    Encrypted(EncryptedContent),
    /// `m.room.member`
    Member {
        /// User whose membership changed
        state_key: String,
        /// New membership
        content: MemberContent,
    },
    /// `m.room.name`
    Name(NameContent),
    /// `m.room.topic`
    Topic(TopicContent),
    /// `m.room.avatar`
    Avatar(AvatarContent),
    /// `m.room.canonical_alias`
    CanonicalAlias(CanonicalAliasContent),
    /// `m.room.tombstone`
    Tombstone(TombstoneContent),
    /// `m.room.redaction`
    Redaction(RedactionContent),
    /// `m.room.aliases`
    Aliases(Value),
    /// `m.room.create`
    Create(Value),
    /// `m.room.encryption`
    Encryption(Value),
    /// `m.room.guest_access`
    GuestAccess(Value),
    /// `m.room.history_visibility`
    HistoryVisibility(Value),
    /// `m.room.join_rules`
    JoinRules(Value),
    /// `m.room.power_levels`
    PowerLevels(Value),
    /// `m.room.pinned_events`
    PinnedEvents(Value),
    /// `m.tag`
    Tag(Value),
    /// `m.room_key_request`
    RoomKeyRequest(Value),
    /// Any other event type
    Unsupported {
        /// The unrecognised `type`
        event_type: String,
    },
}

/// `m.room.message` content by `msgtype`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// `m.text`
    Text(TextContent),
    /// `m.emote`
    Emote(TextContent),
    /// `m.notice`
    Notice(TextContent),
    /// `m.image`
    Image(MediaContent),
    /// `m.video`
    Video(MediaContent),
    /// `m.audio`
    Audio(MediaContent),
    /// `m.file`
    File(MediaContent),
    /// Unrecognised or missing `msgtype`
    Unknown {
        /// The declared `msgtype`, empty if absent
        msgtype: String,
        /// Fallback body
        body: String,
    },
}

impl MessageContent {
    /// Plain-text body of any message kind.
    pub fn body(&self) -> &str {
        match self {
            Self::Text(c) | Self::Emote(c) | Self::Notice(c) => &c.body,
            Self::Image(c) | Self::Video(c) | Self::Audio(c) | Self::File(c) => &c.body,
            Self::Unknown { body, .. } => body,
        }
    }
}

/// Text, emote and notice content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    /// Plain-text body
    #[serde(default)]
    pub body: String,
    /// Markup format of `formatted_body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Rich-text body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_body: Option<String>,
}

/// Image, video, audio, file and sticker content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    /// Description or filename
    #[serde(default)]
    pub body: String,
    /// Content URL (`mxc://...`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Optional media metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<MediaInfo>,
}

/// Media metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Width in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u64>,
    /// Height in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u64>,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// `m.room.encrypted` content (Megolm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    /// Encryption algorithm identifier
    #[serde(default)]
    pub algorithm: String,
    /// Base64 group message
    pub ciphertext: String,
    /// Group session that encrypted the payload
    pub session_id: String,
    /// Curve25519 key of the sending device
    #[serde(default)]
    pub sender_key: String,
    /// Sending device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// `m.room.member` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContent {
    /// `join`, `leave`, `invite`, `ban` or `knock`
    pub membership: String,
    /// Display name in this room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    /// Avatar in this room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// `m.room.name` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameContent {
    /// Room name
    #[serde(default)]
    pub name: String,
}

/// `m.room.topic` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicContent {
    /// Room topic
    #[serde(default)]
    pub topic: String,
}

/// `m.room.avatar` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarContent {
    /// Avatar URL, absent when removed
    #[serde(default)]
    pub url: Option<String>,
}

/// `m.room.canonical_alias` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalAliasContent {
    /// Canonical alias, absent when removed
    #[serde(default)]
    pub alias: Option<String>,
}

/// `m.room.tombstone` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneContent {
    /// Reason shown to users
    #[serde(default)]
    pub body: String,
    /// Room that replaces this one
    pub replacement_room: String,
}

/// `m.room.redaction` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionContent {
    /// Redacted event id (top-level in older room versions)
    #[serde(default)]
    pub redacts: Option<String>,
    /// Reason for the redaction
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    event_id: String,
    room_id: String,
    sender: String,
    origin_server_ts: u64,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    unsigned: Option<Value>,
    #[serde(default)]
    state_key: Option<String>,
    #[serde(default)]
    redacts: Option<String>,
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    msgtype: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    formatted_body: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    info: Option<MediaInfo>,
}

impl RawMessage {
    fn into_content(self) -> MessageContent {
        let RawMessage { msgtype, body, format, formatted_body, url, info } = self;
        let text = |body| TextContent { body, format, formatted_body };
        let media = |body| MediaContent { body, url, info };

        match msgtype.as_str() {
            "m.text" => MessageContent::Text(text(body)),
            "m.emote" => MessageContent::Emote(text(body)),
            "m.notice" => MessageContent::Notice(text(body)),
            "m.image" => MessageContent::Image(media(body)),
            "m.video" => MessageContent::Video(media(body)),
            "m.audio" => MessageContent::Audio(media(body)),
            "m.file" => MessageContent::File(media(body)),
            _ => MessageContent::Unknown { msgtype, body },
        }
    }
}

/// Parse one raw event.
///
/// `room_id` fills the envelope's room when the document omits it, as
/// `/sync` timeline events do.
///
/// # Errors
///
/// - `NotAnObject` if `value` is not a JSON object
/// - `InvalidEnvelope` if id, sender, timestamp or type are missing
/// - `InvalidContent` if a recognised type carries malformed content
pub fn parse_timeline_event(value: Value, room_id: &str) -> Result<RoomEvent, ParseError> {
    let Value::Object(mut object) = value else {
        return Err(ParseError::NotAnObject);
    };
    object.entry("room_id").or_insert_with(|| Value::String(room_id.to_owned()));
    let source = Value::Object(object);

    let envelope = RawEnvelope::deserialize(&source)
        .map_err(|e| ParseError::InvalidEnvelope(e.to_string()))?;
    let content = parse_content(&envelope)?;

    Ok(RoomEvent {
        event_id: envelope.event_id,
        room_id: envelope.room_id,
        sender: envelope.sender,
        origin_server_ts: envelope.origin_server_ts,
        event_type: envelope.event_type,
        unsigned: envelope.unsigned.filter(|u| !u.is_null()),
        content,
        source,
    })
}

/// Parse a batch of raw events, dropping (and logging) malformed ones.
pub fn parse_timeline_events(
    values: impl IntoIterator<Item = Value>,
    room_id: &str,
) -> Vec<RoomEvent> {
    values
        .into_iter()
        .filter_map(|value| match parse_timeline_event(value, room_id) {
            Ok(event) => Some(event),
            Err(error) => {
                tracing::warn!(target: LOG_NET, room_id, %error, "dropping malformed timeline event");
                None
            },
        })
        .collect()
}

/// Merge envelope fields into a decrypted plaintext document.
///
/// The plaintext is attacker-influenced; everything that identifies the event
/// comes from the authenticated envelope.
pub(crate) fn inject_envelope(plaintext: &mut Map<String, Value>, envelope: &RoomEvent) {
    plaintext.insert("event_id".to_string(), Value::String(envelope.event_id.clone()));
    plaintext.insert("room_id".to_string(), Value::String(envelope.room_id.clone()));
    plaintext.insert("sender".to_string(), Value::String(envelope.sender.clone()));
    plaintext.insert("origin_server_ts".to_string(), Value::from(envelope.origin_server_ts));
    plaintext.insert("unsigned".to_string(), envelope.unsigned.clone().unwrap_or(Value::Null));
}

fn parse_content(envelope: &RawEnvelope) -> Result<EventContent, ParseError> {
    let raw = if envelope.content.is_null() { Value::Object(Map::new()) } else { envelope.content.clone() };
    let event_type = envelope.event_type.as_str();

    let content = match event_type {
        "m.room.message" => EventContent::Message(typed::<RawMessage>(event_type, raw)?.into_content()),
        "m.sticker" => EventContent::Sticker(typed(event_type, raw)?),
        "m.room.encrypted" => EventContent::Encrypted(typed(event_type, raw)?),
        "m.room.member" => EventContent::Member {
            state_key: envelope.state_key.clone().unwrap_or_default(),
            content: typed(event_type, raw)?,
        },
        "m.room.name" => EventContent::Name(typed(event_type, raw)?),
        "m.room.topic" => EventContent::Topic(typed(event_type, raw)?),
        "m.room.avatar" => EventContent::Avatar(typed(event_type, raw)?),
        "m.room.canonical_alias" => EventContent::CanonicalAlias(typed(event_type, raw)?),
        "m.room.tombstone" => EventContent::Tombstone(typed(event_type, raw)?),
        "m.room.redaction" => {
            let mut content: RedactionContent = typed(event_type, raw)?;
            if content.redacts.is_none() {
                content.redacts.clone_from(&envelope.redacts);
            }
            EventContent::Redaction(content)
        },
        "m.room.aliases" => EventContent::Aliases(raw),
        "m.room.create" => EventContent::Create(raw),
        "m.room.encryption" => EventContent::Encryption(raw),
        "m.room.guest_access" => EventContent::GuestAccess(raw),
        "m.room.history_visibility" => EventContent::HistoryVisibility(raw),
        "m.room.join_rules" => EventContent::JoinRules(raw),
        "m.room.power_levels" => EventContent::PowerLevels(raw),
        "m.room.pinned_events" => EventContent::PinnedEvents(raw),
        "m.tag" => EventContent::Tag(raw),
        "m.room_key_request" => EventContent::RoomKeyRequest(raw),
        other => EventContent::Unsupported { event_type: other.to_string() },
    };

    Ok(content)
}

fn typed<T: serde::de::DeserializeOwned>(event_type: &str, raw: Value) -> Result<T, ParseError> {
    serde_json::from_value(raw).map_err(|e| ParseError::InvalidContent {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}
