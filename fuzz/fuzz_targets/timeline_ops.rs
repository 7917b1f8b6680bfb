//! Fuzz target for timeline operation sequences
//!
//! Drives a timeline through arbitrary interleavings of live batches,
//! pagination requests, responses (current or stale, success or failure),
//! resets and reads, over a store that fails at a fuzzed rate.
//!
//! # Invariants
//!
//! - The timeline NEVER panics
//! - At most one fetch is in flight
//! - `order` has no duplicate ids and matches `row_count`
//! - Every row in range projects; reads past the end return `None`

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use backscroll_store::{ChaoticSessionStore, MemorySessionStore};
use backscroll_timeline::{
    FetchRequest, MemberProfiles, MessagesBatch, PaginationState, SyncBatch, Timeline,
    TimelineConfig, TransportError, parse_timeline_event,
};
use libfuzzer_sys::fuzz_target;
use serde_json::json;

const ROOM: &str = "!fuzz:example.org";

#[derive(Debug, Arbitrary)]
struct Scenario {
    /// Seed for the chaotic store
    chaos_seed: u64,
    /// 0-10 maps to 0%-100%
    failure_rate: u8,
    memoize: bool,
    ops: Vec<Op>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Live { ids: Vec<u8>, token: Option<u8> },
    Fetch,
    Respond { which: u8, ids: Vec<u8>, end: Option<u8>, fail: bool },
    Reset,
    Read { row: u16 },
}

fn event(id: u8) -> Option<backscroll_timeline::RoomEvent> {
    let value = if id % 4 == 0 {
        json!({
            "event_id": format!("${id}"),
            "sender": format!("@u{}:x", id % 3),
            "origin_server_ts": u64::from(id) * 1_000,
            "type": "m.room.encrypted",
            "content": {
                "algorithm": "m.megolm.v1.aes-sha2",
                "ciphertext": "AAAA",
                "session_id": "s",
                "sender_key": "k",
            },
        })
    } else {
        json!({
            "event_id": format!("${id}"),
            "sender": format!("@u{}:x", id % 3),
            "origin_server_ts": u64::from(id) * 1_000,
            "type": "m.room.message",
            "content": { "msgtype": "m.text", "body": format!("{id}") },
        })
    };
    parse_timeline_event(value, ROOM).ok()
}

fn events(ids: &[u8]) -> Vec<backscroll_timeline::RoomEvent> {
    ids.iter().copied().filter_map(event).collect()
}

fuzz_target!(|scenario: Scenario| {
    let rate = f64::from(scenario.failure_rate.min(10)) / 10.0;
    let sessions = ChaoticSessionStore::with_seed(MemorySessionStore::new(), rate, scenario.chaos_seed);
    let config = TimelineConfig { memoize_decryption: scenario.memoize, ..TimelineConfig::default() };
    let mut timeline = Timeline::new(ROOM, sessions, MemberProfiles::new(), config);
    let mut requests: Vec<FetchRequest> = Vec::new();

    for op in scenario.ops.into_iter().take(256) {
        match op {
            Op::Live { ids, token } => {
                timeline.add_events(SyncBatch {
                    events: events(&ids),
                    prev_batch: token.map(|t| format!("t{t}")),
                });
            },
            Op::Fetch => {
                let was_idle = timeline.pagination_state() == PaginationState::Idle;
                let request = timeline.fetch_older();
                if !was_idle {
                    assert!(request.is_none());
                }
                requests.extend(request);
            },
            Op::Respond { which, ids, end, fail } => {
                if requests.is_empty() {
                    continue;
                }
                let request = requests.remove(usize::from(which) % requests.len());
                let result = if fail {
                    Err(TransportError::new("M_UNKNOWN", "fuzz"))
                } else {
                    Ok(MessagesBatch { chunk: events(&ids), end: end.map(|e| format!("t{e}")) })
                };
                timeline.apply_messages(request.generation, result);
            },
            Op::Reset => timeline.reset(),
            Op::Read { row } => {
                let row = usize::from(row);
                if row < timeline.row_count() {
                    assert!(timeline.row(row).is_some());
                } else {
                    assert!(timeline.row(row).is_none());
                }
            },
        }

        let unique: HashSet<_> = timeline.order().iter().collect();
        assert_eq!(unique.len(), timeline.row_count());

        let live = requests
            .iter()
            .filter(|r| {
                timeline.pagination_state()
                    == PaginationState::FetchInFlight { generation: r.generation }
            })
            .count();
        assert!(live <= 1);
    }
});
