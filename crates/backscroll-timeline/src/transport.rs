//! Sync and `/messages` batches, and the transport that fetches them.
//!
//! The timeline never performs I/O. It emits a
//! [`FetchRequest`](crate::FetchRequest); the embedding runtime turns that
//! into a [`MessagesTransport`] call and feeds the result back.

use std::future::Future;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{ParseError, TransportError},
    event::{RoomEvent, parse_timeline_events},
};

/// Forward events for a room from one sync response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncBatch {
    /// Events in chronological order, oldest first
    pub events: Vec<RoomEvent>,
    /// Token for paginating backwards from the start of this batch
    pub prev_batch: Option<String>,
}

/// One page of older events from `/messages` (direction backwards).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagesBatch {
    /// Events newest first
    pub chunk: Vec<RoomEvent>,
    /// Token for the next older page; `None` once history is exhausted
    pub end: Option<String>,
}

#[derive(Deserialize)]
struct RawSyncBatch {
    #[serde(default)]
    events: Vec<Value>,
    #[serde(default)]
    prev_batch: Option<String>,
}

#[derive(Deserialize)]
struct RawMessagesBatch {
    #[serde(default)]
    chunk: Vec<Value>,
    #[serde(default)]
    end: Option<String>,
}

impl SyncBatch {
    /// Parse a room's `timeline` object from a sync response.
    ///
    /// Malformed events are dropped; a malformed wrapper is an error.
    pub fn from_json(value: Value, room_id: &str) -> Result<Self, ParseError> {
        let raw = RawSyncBatch::deserialize(value)
            .map_err(|e| ParseError::InvalidEnvelope(format!("sync batch: {e}")))?;
        Ok(Self { events: parse_timeline_events(raw.events, room_id), prev_batch: raw.prev_batch })
    }
}

impl MessagesBatch {
    /// Parse a `/messages` response body.
    ///
    /// Malformed events are dropped; a malformed wrapper is an error.
    pub fn from_json(value: Value, room_id: &str) -> Result<Self, ParseError> {
        let raw = RawMessagesBatch::deserialize(value)
            .map_err(|e| ParseError::InvalidEnvelope(format!("messages batch: {e}")))?;
        Ok(Self { chunk: parse_timeline_events(raw.chunk, room_id), end: raw.end })
    }
}

/// Fetches pages of room history.
pub trait MessagesTransport {
    /// Request events older than `from`, newest first.
    fn fetch_messages(
        &self,
        room_id: &str,
        from: &str,
    ) -> impl Future<Output = Result<MessagesBatch, TransportError>> + Send;
}
