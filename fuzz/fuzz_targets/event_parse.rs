//! Fuzz target for the timeline event parser
//!
//! Feeds arbitrary bytes through JSON decoding and `parse_timeline_event`,
//! then projects every role of whatever parsed.
//!
//! # Invariants
//!
//! - Parsing NEVER panics; malformed events are `Err`
//! - A parsed event without its own room id takes the requested one
//! - Projecting a parsed event NEVER panics, encrypted or not

#![no_main]

use backscroll_store::MemorySessionStore;
use backscroll_timeline::{
    MemberProfiles, Role, SyncBatch, Timeline, TimelineConfig, parse_timeline_event,
};
use libfuzzer_sys::fuzz_target;

const ROOM: &str = "!fuzz:example.org";

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let had_room = value.get("room_id").is_some();

    let Ok(event) = parse_timeline_event(value, ROOM) else {
        return;
    };
    if !had_room {
        assert_eq!(event.room_id(), ROOM);
    }

    let mut profiles = MemberProfiles::new();
    profiles.observe(&event);
    let mut timeline =
        Timeline::new(ROOM, MemorySessionStore::new(), profiles, TimelineConfig::default());
    timeline.add_events(SyncBatch { events: vec![event], prev_batch: None });

    for role in Role::ALL {
        assert!(timeline.data(0, role).is_some());
    }
    let _ = timeline.raw_event(&timeline.order()[0].clone());
});
