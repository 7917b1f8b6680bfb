//! Scenario tests for the timeline.
//!
//! Walks a room through sync, backward pagination and reads, checking row
//! contents, insertion notifications and section labels along the way.

use std::{cell::RefCell, rc::Rc};

use backscroll_crypto::InboundGroupSession;
use backscroll_timeline::{
    EventKind, MegolmSessionIndex, MemberProfiles, MessagesBatch, PaginationState, Role,
    RowValue, SessionStore, StorageError, SyncBatch, SyncState, Timeline, TimelineConfig,
    TimelineObserver, parse_timeline_event,
};
use serde_json::{Value, json};

const ROOM: &str = "!room:example.org";

struct NoSessions;

impl SessionStore for NoSessions {
    fn has_inbound_session(&self, _index: &MegolmSessionIndex) -> Result<bool, StorageError> {
        Ok(false)
    }

    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError> {
        Err(StorageError::MissingSession { session_id: index.session_id.clone() })
    }
}

#[derive(Clone, Default)]
struct Notifications(Rc<RefCell<Vec<(usize, usize)>>>);

impl TimelineObserver for Notifications {
    fn rows_inserted(&mut self, start: usize, end: usize) {
        self.0.borrow_mut().push((start, end));
    }
}

fn raw_text(id: &str, sender: &str, ts: u64) -> Value {
    json!({
        "event_id": id,
        "sender": sender,
        "origin_server_ts": ts,
        "type": "m.room.message",
        "content": { "msgtype": "m.text", "body": format!("hello from {id}") },
    })
}

fn sync(events: Vec<Value>, prev_batch: &str) -> SyncBatch {
    SyncBatch::from_json(json!({ "events": events, "prev_batch": prev_batch }), ROOM).unwrap()
}

fn messages(chunk: Vec<Value>, end: Option<&str>) -> MessagesBatch {
    MessagesBatch::from_json(json!({ "chunk": chunk, "end": end }), ROOM).unwrap()
}

fn new_timeline() -> (Timeline<NoSessions, MemberProfiles>, Notifications) {
    let mut timeline =
        Timeline::new(ROOM, NoSessions, MemberProfiles::new(), TimelineConfig::default());
    let notifications = Notifications::default();
    timeline.subscribe(Box::new(notifications.clone()));
    (timeline, notifications)
}

fn text_of(value: Option<RowValue>) -> String {
    match value {
        Some(RowValue::Text(text)) => text,
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn forward_then_backward_end_to_end() {
    let (mut timeline, notifications) = new_timeline();

    timeline.add_events(sync(vec![raw_text("$1", "@a", 1000)], "tok1"));
    assert_eq!(timeline.row_count(), 1);
    assert_eq!(text_of(timeline.data(0, Role::UserId)), "@a");

    let request = timeline.fetch_older().unwrap();
    assert_eq!(request.from, "tok1");
    assert_eq!(request.room_id, ROOM);

    timeline.apply_messages(request.generation, Ok(messages(vec![raw_text("$0", "@a", 900)], Some("tok2"))));

    assert_eq!(timeline.order(), ["$0", "$1"]);
    assert_eq!(timeline.row_count(), 2);
    assert_eq!(timeline.pagination_token(), Some("tok2"));
    assert_eq!(timeline.pagination_state(), PaginationState::Idle);
    assert_eq!(*notifications.0.borrow(), [(0, 0), (0, 0)]);
}

#[test]
fn backward_chunk_is_reversed_before_prepend() {
    let (mut timeline, notifications) = new_timeline();
    timeline.add_events(sync(vec![raw_text("$4", "@a", 4), raw_text("$5", "@a", 5)], "t"));

    let request = timeline.fetch_older().unwrap();
    timeline.apply_messages(
        request.generation,
        Ok(messages(
            vec![raw_text("$3", "@a", 3), raw_text("$2", "@a", 2), raw_text("$1", "@a", 1)],
            Some("older"),
        )),
    );

    assert_eq!(timeline.order(), ["$1", "$2", "$3", "$4", "$5"]);
    assert_eq!(*notifications.0.borrow(), [(0, 1), (0, 2)]);
}

#[test]
fn empty_forward_batch_changes_nothing() {
    let (mut timeline, notifications) = new_timeline();
    timeline.add_events(sync(vec![raw_text("$1", "@a", 1)], "t"));

    let range = timeline.add_events(sync(Vec::new(), "ignored"));

    assert_eq!(range, None);
    assert_eq!(timeline.order(), ["$1"]);
    assert_eq!(notifications.0.borrow().len(), 1);
    assert_eq!(timeline.pagination_token(), Some("t"));
}

#[test]
fn second_fetch_while_in_flight_is_a_no_op() {
    let (mut timeline, _) = new_timeline();
    timeline.add_events(sync(vec![raw_text("$1", "@a", 1)], "t"));

    assert!(timeline.fetch_older().is_some());
    assert!(timeline.fetch_older().is_none());
    assert!(timeline.fetch_older().is_none());
}

#[test]
fn section_changes_only_at_sender_transition() {
    let (mut timeline, _) = new_timeline();
    timeline.add_events(sync(
        vec![
            raw_text("$1", "@a:x", 10_000),
            raw_text("$2", "@a:x", 20_000),
            raw_text("$3", "@a:x", 30_000),
            raw_text("$4", "@b:x", 40_000),
        ],
        "t",
    ));

    let sections: Vec<_> = (0..4).map(|row| text_of(timeline.data(row, Role::Section))).collect();
    assert_eq!(sections, ["@a:x", "@a:x", "@a:x", "@b:x"]);
}

#[test]
fn encrypted_row_without_keys_renders_placeholder() {
    let (mut timeline, _) = new_timeline();
    timeline.add_events(sync(
        vec![json!({
            "event_id": "$enc",
            "sender": "@a:x",
            "origin_server_ts": 77,
            "type": "m.room.encrypted",
            "content": {
                "algorithm": "m.megolm.v1.aes-sha2",
                "ciphertext": "AAAA",
                "session_id": "missing",
                "sender_key": "key",
            },
        })],
        "t",
    ));

    let row = timeline.row(0).unwrap();
    assert_eq!(row.kind, EventKind::NoticeMessage);
    assert_eq!(row.body, "-- Encrypted Event (No keys found for decryption) --");
    assert_eq!(row.id, "$enc");
    assert_eq!(row.user_id, "@a:x");
    assert_eq!(row.timestamp.timestamp_millis(), 77);
    assert_eq!(timeline.data(0, Role::Type), Some(RowValue::Kind(EventKind::NoticeMessage)));
}

#[test]
fn reset_returns_to_initial_state() {
    let (mut timeline, _) = new_timeline();
    timeline.add_events(sync(vec![raw_text("$1", "@a", 1)], "t"));
    timeline.fetch_older();

    timeline.reset();

    assert_eq!(timeline.row_count(), 0);
    assert_eq!(timeline.sync_state(), SyncState::NotYetSynced);
    assert_eq!(timeline.pagination_state(), PaginationState::Idle);
    assert!(!timeline.has_more_history());
}

#[test]
fn member_events_feed_display_names() {
    let member = parse_timeline_event(
        json!({
            "event_id": "$m",
            "sender": "@a:x",
            "state_key": "@a:x",
            "origin_server_ts": 1,
            "type": "m.room.member",
            "content": { "membership": "join", "displayname": "Alice", "avatar_url": "mxc://x/a" },
        }),
        ROOM,
    )
    .unwrap();
    let mut profiles = MemberProfiles::new();
    profiles.observe(&member);

    let mut timeline = Timeline::new(ROOM, NoSessions, profiles, TimelineConfig::default());
    timeline.add_events(SyncBatch { events: vec![member], prev_batch: None });

    assert_eq!(text_of(timeline.data(0, Role::UserName)), "Alice");
    assert_eq!(timeline.avatar_url("@a:x"), "mxc://x/a");
    assert_eq!(timeline.data(0, Role::Type), Some(RowValue::Kind(EventKind::Member)));
}
