//! One room's timeline: storage, pagination, decrypt-on-read, projection.
//!
//! The timeline is Sans-IO. Live events arrive through [`Timeline::add_events`].
//! Older history is requested with [`Timeline::fetch_older`], which yields a
//! [`FetchRequest`] for the caller to execute; the response comes back through
//! [`Timeline::apply_messages`]. Reads (`data`, `row`) decrypt encrypted rows
//! on the fly and never mutate the store.
//!
//! # Invariants
//!
//! - At most one backward fetch is in flight
//! - Rows are oldest first; forward batches land at the tail, backward chunks
//!   at the head
//! - Every non-empty insertion notifies observers exactly once with the
//!   inserted range
//! - A decrypted row shows the envelope's id, sender and timestamp

use std::{borrow::Cow, cell::RefCell, fmt};

use chrono::FixedOffset;

use crate::{
    LOG_CRYPTO, LOG_UI,
    config::TimelineConfig,
    decryption::{
        DecryptionCache, DecryptionFailure, DecryptionPipeline, DecryptionResult, GroupDecryptor,
        MegolmDecryptor, MegolmSessionIndex, SessionStore,
    },
    error::{TimelineError, TransportError},
    event::{EventContent, RoomEvent},
    pagination::{FetchRequest, PaginationController, PaginationOutcome, PaginationState},
    profile::ProfileResolver,
    projection::{self, EventKind, Role, RowValue, TimelineRow},
    store::{EventStore, InsertedRange},
    transport::{MessagesBatch, SyncBatch},
};

/// Whether the first forward batch has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No forward batch yet; the next one sets the pagination cursor
    NotYetSynced,
    /// The pagination cursor has been taken from a sync batch
    Synced,
}

/// Receives row insertion notifications.
pub trait TimelineObserver {
    /// Rows `start..=end` were inserted.
    fn rows_inserted(&mut self, start: usize, end: usize);
}

/// A room timeline.
pub struct Timeline<S, P, D = MegolmDecryptor> {
    room_id: String,
    offset: FixedOffset,
    store: EventStore,
    pagination: PaginationController,
    sync_state: SyncState,
    pipeline: DecryptionPipeline<S, D>,
    profiles: P,
    cache: Option<RefCell<DecryptionCache>>,
    observers: Vec<Box<dyn TimelineObserver>>,
}

impl<S: SessionStore, P: ProfileResolver> Timeline<S, P> {
    /// Create an empty timeline decrypting with [`MegolmDecryptor`].
    pub fn new(
        room_id: impl Into<String>,
        sessions: S,
        profiles: P,
        config: TimelineConfig,
    ) -> Self {
        Self::with_decryptor(room_id, sessions, MegolmDecryptor, profiles, config)
    }
}

impl<S: SessionStore, P: ProfileResolver, D: GroupDecryptor> Timeline<S, P, D> {
    /// Create an empty timeline with a custom decryptor.
    pub fn with_decryptor(
        room_id: impl Into<String>,
        sessions: S,
        decryptor: D,
        profiles: P,
        config: TimelineConfig,
    ) -> Self {
        let room_id = room_id.into();
        Self {
            offset: config.utc_offset(),
            store: EventStore::new(),
            pagination: PaginationController::new(room_id.clone()),
            sync_state: SyncState::NotYetSynced,
            pipeline: DecryptionPipeline::new(sessions, decryptor, config.placeholders),
            profiles,
            cache: config.memoize_decryption.then(|| RefCell::new(DecryptionCache::new())),
            observers: Vec::new(),
            room_id,
        }
    }

    /// Room this timeline shows.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Whether the first sync batch has arrived.
    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    /// Backward pagination state.
    pub fn pagination_state(&self) -> PaginationState {
        self.pagination.state()
    }

    /// Token the next backward fetch starts from.
    pub fn pagination_token(&self) -> Option<&str> {
        self.pagination.cursor()
    }

    /// False once the server reported the start of the room.
    pub fn has_more_history(&self) -> bool {
        self.pagination.has_more()
    }

    /// The underlying store.
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The session store decryption reads from.
    pub fn sessions(&self) -> &S {
        self.pipeline.sessions()
    }

    /// Register an observer for row insertions.
    pub fn subscribe(&mut self, observer: Box<dyn TimelineObserver>) {
        self.observers.push(observer);
    }

    /// Append a forward (live) batch.
    ///
    /// The first batch after creation or [`reset`](Self::reset) sets the
    /// pagination cursor from its `prev_batch`, even when it has no events.
    pub fn add_events(&mut self, batch: SyncBatch) -> Option<InsertedRange> {
        if self.sync_state == SyncState::NotYetSynced {
            tracing::debug!(
                target: LOG_UI,
                room_id = %self.room_id,
                prev_batch = ?batch.prev_batch,
                "initial sync batch"
            );
            self.pagination.set_cursor(batch.prev_batch);
            self.sync_state = SyncState::Synced;
        }

        let range = self.store.append_forward(batch.events);
        self.notify(range);
        range
    }

    /// Ask for older history.
    ///
    /// `None` if a fetch is already in flight or history is exhausted.
    pub fn fetch_older(&mut self) -> Option<FetchRequest> {
        self.pagination.fetch_older()
    }

    /// Feed back the response to a [`FetchRequest`].
    pub fn apply_messages(
        &mut self,
        generation: u64,
        result: Result<MessagesBatch, TransportError>,
    ) -> Option<InsertedRange> {
        match self.pagination.complete(generation, result) {
            PaginationOutcome::Apply(chunk) => {
                let range = self.store.prepend_backward(chunk);
                self.notify(range);
                range
            },
            PaginationOutcome::Failed(_) | PaginationOutcome::Stale => None,
        }
    }

    /// Drop all events and start over as if newly created.
    ///
    /// A fetch still in flight is discarded when its response arrives.
    pub fn reset(&mut self) {
        tracing::info!(target: LOG_UI, room_id = %self.room_id, "resetting timeline");
        self.store.clear();
        self.pagination.reset();
        self.sync_state = SyncState::NotYetSynced;
        if let Some(cache) = &self.cache {
            cache.borrow_mut().clear();
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.store.len()
    }

    /// Event ids, oldest first.
    pub fn order(&self) -> &[String] {
        self.store.order()
    }

    /// Stored event by id (encrypted events as received).
    pub fn event(&self, event_id: &str) -> Result<&RoomEvent, TimelineError> {
        self.store.get(event_id)
    }

    /// The event a row displays: decrypted if encrypted, else as stored.
    pub fn resolve(&self, row: usize) -> Option<Cow<'_, RoomEvent>> {
        self.resolve_with_failure(row).map(|(event, _)| event)
    }

    /// Decrypt a stored encrypted event.
    ///
    /// Served from the cache when memoization is on.
    pub fn decrypt_event(&self, event: &RoomEvent) -> Option<DecryptionResult> {
        let EventContent::Encrypted(encrypted) = event.content() else {
            return None;
        };

        let Some(cache) = &self.cache else {
            return Some(self.pipeline.decrypt(event, encrypted));
        };

        if let Some(hit) = cache.borrow().get(event.event_id()) {
            return Some(hit.clone());
        }

        let result = self.pipeline.decrypt(event, encrypted);
        cache.borrow_mut().insert(
            event.event_id().to_string(),
            MegolmSessionIndex::for_event(event, encrypted),
            result.clone(),
        );
        Some(result)
    }

    /// Forget cached results decrypted (or failed) under `index`.
    ///
    /// Call when keys for that session arrive. No-op without memoization.
    pub fn invalidate_session(&self, index: &MegolmSessionIndex) {
        if let Some(cache) = &self.cache {
            let removed = cache.borrow_mut().invalidate(index);
            tracing::debug!(
                target: LOG_CRYPTO,
                session_id = %index.session_id,
                removed,
                "invalidated decryption cache"
            );
        }
    }

    /// One role of one row. `None` if `row` is out of range.
    pub fn data(&self, row: usize, role: Role) -> Option<RowValue> {
        let value = match role {
            Role::Id => RowValue::Text(self.store.order().get(row)?.clone()),
            Role::Section => RowValue::Text(projection::section_key(&self.store, row, self.offset)?),
            _ => {
                let event = self.resolve(row)?;
                match role {
                    Role::Type => RowValue::Kind(EventKind::of(&event)),
                    Role::Body => RowValue::Text(projection::body(&event)),
                    Role::FormattedBody => RowValue::Text(projection::formatted_body(&event)),
                    Role::UserId => RowValue::Text(event.sender().to_string()),
                    Role::UserName => RowValue::Text(self.display_name(event.sender())),
                    Role::Timestamp => RowValue::Timestamp(projection::timestamp(&event)),
                    Role::Url => RowValue::Text(projection::url(&event)),
                    Role::Height => RowValue::Size(projection::height(&event)),
                    Role::Width => RowValue::Size(projection::width(&event)),
                    Role::ProportionalHeight => RowValue::Ratio(projection::proportional_height(&event)),
                    Role::Id | Role::Section => return None,
                }
            },
        };
        Some(value)
    }

    /// Every role of one row, decrypting at most once.
    pub fn row(&self, row: usize) -> Option<TimelineRow> {
        let (event, failure) = self.resolve_with_failure(row)?;
        let section = projection::section_key(&self.store, row, self.offset)?;

        Some(TimelineRow {
            id: event.event_id().to_string(),
            section,
            kind: EventKind::of(&event),
            body: projection::body(&event),
            formatted_body: projection::formatted_body(&event),
            user_id: event.sender().to_string(),
            user_name: self.display_name(event.sender()),
            timestamp: projection::timestamp(&event),
            url: projection::url(&event),
            width: projection::width(&event),
            height: projection::height(&event),
            proportional_height: projection::proportional_height(&event),
            decryption_failure: failure,
        })
    }

    /// Row at `row`, or an error naming the range.
    pub fn try_row(&self, row: usize) -> Result<TimelineRow, TimelineError> {
        self.row(row).ok_or(TimelineError::RowOutOfRange { row, len: self.row_count() })
    }

    /// Display name of `user_id` in this room.
    pub fn display_name(&self, user_id: &str) -> String {
        self.profiles.display_name(&self.room_id, user_id)
    }

    /// Avatar URL of `user_id` in this room.
    pub fn avatar_url(&self, user_id: &str) -> String {
        self.profiles.avatar_url(&self.room_id, user_id)
    }

    /// Stored JSON of an event, pretty-printed with four-space indentation.
    pub fn raw_event(&self, event_id: &str) -> Result<String, TimelineError> {
        use serde::Serialize;

        let event = self.store.get(event_id)?;
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        event
            .source()
            .serialize(&mut serializer)
            .map_err(|e| TimelineError::Serialization(e.to_string()))?;
        String::from_utf8(out).map_err(|e| TimelineError::Serialization(e.to_string()))
    }

    fn resolve_with_failure(
        &self,
        row: usize,
    ) -> Option<(Cow<'_, RoomEvent>, Option<DecryptionFailure>)> {
        let event = self.store.event_at(row)?;
        match self.decrypt_event(event) {
            Some(result) => Some((Cow::Owned(result.event), result.failure)),
            None => Some((Cow::Borrowed(event), None)),
        }
    }

    fn notify(&mut self, range: Option<InsertedRange>) {
        let Some(range) = range else {
            return;
        };
        tracing::debug!(
            target: LOG_UI,
            room_id = %self.room_id,
            start = range.start,
            end = range.end,
            "rows inserted"
        );
        for observer in &mut self.observers {
            observer.rows_inserted(range.start, range.end);
        }
    }
}

impl<S, P, D> fmt::Debug for Timeline<S, P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("room_id", &self.room_id)
            .field("rows", &self.store.len())
            .field("sync_state", &self.sync_state)
            .field("pagination", &self.pagination.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::HashMap, rc::Rc};

    use backscroll_crypto::{InboundGroupSession, NONCE_RANDOM_SIZE, OutboundGroupSession};
    use serde_json::{Value, json};

    use super::*;
    use crate::{error::StorageError, event::parse_timeline_event, profile::MemberProfiles};

    const ROOM: &str = "!room:example.org";
    const SENDER_KEY: &str = "curve-key";

    #[derive(Default)]
    struct CountingSessions {
        sessions: HashMap<MegolmSessionIndex, InboundGroupSession>,
        lookups: Cell<usize>,
    }

    impl SessionStore for CountingSessions {
        fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self.sessions.contains_key(index))
        }

        fn inbound_session(
            &self,
            index: &MegolmSessionIndex,
        ) -> Result<InboundGroupSession, StorageError> {
            self.sessions
                .get(index)
                .cloned()
                .ok_or_else(|| StorageError::MissingSession { session_id: index.session_id.clone() })
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<(usize, usize)>>>);

    impl TimelineObserver for Recorder {
        fn rows_inserted(&mut self, start: usize, end: usize) {
            self.0.borrow_mut().push((start, end));
        }
    }

    fn text(id: &str, sender: &str, ts: u64) -> RoomEvent {
        parse_timeline_event(
            json!({
                "event_id": id,
                "sender": sender,
                "origin_server_ts": ts,
                "type": "m.room.message",
                "content": { "msgtype": "m.text", "body": format!("body of {id}") },
            }),
            ROOM,
        )
        .unwrap()
    }

    fn encrypted(outbound: &mut OutboundGroupSession, id: &str, payload: &Value) -> RoomEvent {
        let ciphertext =
            outbound.encrypt(payload.to_string().as_bytes(), [1; NONCE_RANDOM_SIZE]).unwrap();
        parse_timeline_event(
            json!({
                "event_id": id,
                "sender": "@alice:example.org",
                "origin_server_ts": 50,
                "type": "m.room.encrypted",
                "content": {
                    "algorithm": "m.megolm.v1.aes-sha2",
                    "ciphertext": ciphertext,
                    "session_id": outbound.session_id(),
                    "sender_key": SENDER_KEY,
                },
            }),
            ROOM,
        )
        .unwrap()
    }

    fn timeline(
        sessions: &CountingSessions,
        config: TimelineConfig,
    ) -> Timeline<&CountingSessions, MemberProfiles> {
        Timeline::new(ROOM, sessions, MemberProfiles::new(), config)
    }

    fn sync(events: Vec<RoomEvent>, prev_batch: Option<&str>) -> SyncBatch {
        SyncBatch { events, prev_batch: prev_batch.map(str::to_string) }
    }

    #[test]
    fn first_sync_sets_cursor_even_when_empty() {
        let sessions = CountingSessions::default();
        let mut timeline = timeline(&sessions, TimelineConfig::default());

        assert_eq!(timeline.add_events(sync(Vec::new(), Some("t0"))), None);
        assert_eq!(timeline.sync_state(), SyncState::Synced);
        assert_eq!(timeline.pagination_token(), Some("t0"));

        timeline.add_events(sync(vec![text("$1", "@a:x", 1)], Some("t9")));
        assert_eq!(timeline.pagination_token(), Some("t0"));
    }

    #[test]
    fn insertions_notify_exact_ranges() {
        let sessions = CountingSessions::default();
        let mut timeline = timeline(&sessions, TimelineConfig::default());
        let recorder = Recorder::default();
        timeline.subscribe(Box::new(recorder.clone()));

        timeline.add_events(sync(vec![text("$3", "@a:x", 3), text("$4", "@a:x", 4)], Some("t")));
        timeline.add_events(sync(Vec::new(), None));
        let request = timeline.fetch_older().unwrap();
        timeline.apply_messages(
            request.generation,
            Ok(MessagesBatch { chunk: vec![text("$2", "@a:x", 2), text("$1", "@a:x", 1)], end: None }),
        );

        assert_eq!(*recorder.0.borrow(), [(0, 1), (0, 1)]);
        assert_eq!(timeline.order(), ["$1", "$2", "$3", "$4"]);
        assert!(!timeline.has_more_history());
    }

    #[test]
    fn failed_fetch_inserts_nothing() {
        let sessions = CountingSessions::default();
        let mut timeline = timeline(&sessions, TimelineConfig::default());
        timeline.add_events(sync(vec![text("$1", "@a:x", 1)], Some("t")));

        let request = timeline.fetch_older().unwrap();
        let range = timeline
            .apply_messages(request.generation, Err(TransportError::new("M_FORBIDDEN", "no")));

        assert_eq!(range, None);
        assert_eq!(timeline.row_count(), 1);
        assert_eq!(timeline.pagination_state(), PaginationState::Idle);
    }

    #[test]
    fn stale_response_after_reset_is_ignored() {
        let sessions = CountingSessions::default();
        let mut timeline = timeline(&sessions, TimelineConfig::default());
        timeline.add_events(sync(vec![text("$5", "@a:x", 5)], Some("t")));
        let request = timeline.fetch_older().unwrap();

        timeline.reset();
        timeline.add_events(sync(vec![text("$9", "@a:x", 9)], Some("fresh")));
        let range = timeline.apply_messages(
            request.generation,
            Ok(MessagesBatch { chunk: vec![text("$1", "@a:x", 1)], end: Some("old".to_string()) }),
        );

        assert_eq!(range, None);
        assert_eq!(timeline.order(), ["$9"]);
        assert_eq!(timeline.pagination_token(), Some("fresh"));
    }

    #[test]
    fn data_projects_roles() {
        let sessions = CountingSessions::default();
        let mut profiles = MemberProfiles::new();
        profiles.set_profile(ROOM, "@a:x", Some("Alice".to_string()), None);
        let mut timeline = Timeline::new(ROOM, &sessions, profiles, TimelineConfig::default());
        timeline.add_events(sync(vec![text("$1", "@a:x", 1_000)], None));

        assert_eq!(timeline.data(0, Role::Id), Some(RowValue::Text("$1".to_string())));
        assert_eq!(timeline.data(0, Role::UserName), Some(RowValue::Text("Alice".to_string())));
        assert_eq!(timeline.data(0, Role::Body), Some(RowValue::Text("body of $1".to_string())));
        assert_eq!(timeline.data(0, Role::Type), Some(RowValue::Kind(EventKind::TextMessage)));
        assert_eq!(timeline.data(0, Role::Section), Some(RowValue::Text("@a:x".to_string())));
        assert_eq!(timeline.data(1, Role::Id), None);
        assert_eq!(timeline.data(1, Role::Body), None);
        assert!(matches!(timeline.try_row(3), Err(TimelineError::RowOutOfRange { row: 3, len: 1 })));
    }

    #[test]
    fn encrypted_rows_decrypt_on_every_read() {
        let mut outbound = OutboundGroupSession::new(&[4; 32]);
        let mut sessions = CountingSessions::default();
        sessions.sessions.insert(
            MegolmSessionIndex::new(ROOM, outbound.session_id(), SENDER_KEY),
            InboundGroupSession::import(&outbound.export()),
        );
        let event = encrypted(
            &mut outbound,
            "$enc",
            &json!({ "type": "m.room.message", "content": { "msgtype": "m.text", "body": "secret" } }),
        );

        let mut timeline = timeline(&sessions, TimelineConfig::default());
        timeline.add_events(sync(vec![event], None));

        for _ in 0..3 {
            assert_eq!(timeline.data(0, Role::Body), Some(RowValue::Text("secret".to_string())));
        }
        assert_eq!(sessions.lookups.get(), 3);
        assert!(timeline.event("$enc").unwrap().is_encrypted());
    }

    #[test]
    fn memoized_rows_decrypt_once_until_invalidated() {
        let mut outbound = OutboundGroupSession::new(&[4; 32]);
        let sessions = CountingSessions::default();
        let event = encrypted(
            &mut outbound,
            "$enc",
            &json!({ "type": "m.room.message", "content": { "msgtype": "m.text", "body": "secret" } }),
        );
        let index = MegolmSessionIndex::new(ROOM, outbound.session_id(), SENDER_KEY);

        let config = TimelineConfig { memoize_decryption: true, ..TimelineConfig::default() };
        let mut timeline = timeline(&sessions, config);
        timeline.add_events(sync(vec![event], None));

        let first = timeline.row(0).unwrap();
        let second = timeline.row(0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.decryption_failure, Some(DecryptionFailure::NoSession));
        assert_eq!(sessions.lookups.get(), 1);

        timeline.invalidate_session(&index);
        timeline.row(0).unwrap();
        assert_eq!(sessions.lookups.get(), 2);
    }

    #[test]
    fn raw_event_uses_four_space_indent() {
        let sessions = CountingSessions::default();
        let mut timeline = timeline(&sessions, TimelineConfig::default());
        timeline.add_events(sync(vec![text("$1", "@a:x", 1)], None));

        let raw = timeline.raw_event("$1").unwrap();
        assert!(raw.contains("\n    \"event_id\": \"$1\""));
        assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), *timeline.event("$1").unwrap().source());
        assert!(matches!(timeline.raw_event("$nope"), Err(TimelineError::NotFound { .. })));
    }

    #[test]
    fn avatar_and_display_name_fall_back() {
        let sessions = CountingSessions::default();
        let timeline = timeline(&sessions, TimelineConfig::default());

        assert_eq!(timeline.display_name("@z:x"), "@z:x");
        assert_eq!(timeline.avatar_url("@z:x"), "");
    }
}
