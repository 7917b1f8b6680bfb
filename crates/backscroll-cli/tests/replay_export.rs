//! End-to-end replay of an encrypted room export.
//!
//! Builds an export whose live and historical events are encrypted with one
//! group session, imports the session key from a key file, and checks the
//! rendered rows before and after the key is available.

use backscroll_cli::{RoomExport, render_timeline, replay};
use backscroll_crypto::{NONCE_RANDOM_SIZE, OutboundGroupSession};
use backscroll_store::{
    MemorySessionStore, RedbSessionStore, SessionKeyRecord, SessionKeyStore, import_session_keys,
};
use backscroll_timeline::{DecryptionFailure, TimelineConfig};
use chrono::{FixedOffset, NaiveDate};
use serde_json::{Value, json};
use tempfile::tempdir;

const ROOM: &str = "!crypt:example.org";
const SENDER_KEY: &str = "device-curve-key";

struct Fixture {
    export: RoomExport,
    key_file: String,
}

fn encrypted(outbound: &mut OutboundGroupSession, id: &str, ts: u64, body: &str) -> Value {
    let payload = json!({ "type": "m.room.message", "content": { "msgtype": "m.text", "body": body } });
    let ciphertext =
        outbound.encrypt(payload.to_string().as_bytes(), [0x44; NONCE_RANDOM_SIZE]).unwrap();
    json!({
        "event_id": id,
        "sender": "@carol:example.org",
        "origin_server_ts": ts,
        "type": "m.room.encrypted",
        "content": {
            "algorithm": "m.megolm.v1.aes-sha2",
            "ciphertext": ciphertext,
            "session_id": outbound.session_id(),
            "sender_key": SENDER_KEY,
        },
    })
}

fn fixture() -> Fixture {
    let mut outbound = OutboundGroupSession::new(&[0x77; 32]);
    let key = outbound.export();

    // Encrypt in chronological order so message indices follow the timeline.
    let oldest = encrypted(&mut outbound, "$1", 1_709_543_700_000, "first");
    let middle = encrypted(&mut outbound, "$2", 1_709_543_760_000, "second");
    let newest = encrypted(&mut outbound, "$3", 1_709_543_820_000, "third");

    let export = RoomExport::from_json(
        &json!({
            "room_id": ROOM,
            "sync": { "events": [newest], "prev_batch": "p1" },
            "history": {
                "p1": { "chunk": [middle], "end": "p2" },
                "p2": { "chunk": [oldest] },
            },
            "profiles": { "@carol:example.org": { "displayname": "Carol" } },
        })
        .to_string(),
    )
    .unwrap();

    let key_file = serde_json::to_string(&[SessionKeyRecord {
        room_id: ROOM.to_string(),
        session_id: key.session_id().to_string(),
        sender_key: SENDER_KEY.to_string(),
        session_key: key.to_base64(),
    }])
    .unwrap();

    Fixture { export, key_file }
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

#[tokio::test]
async fn without_keys_every_row_is_a_placeholder() {
    let fixture = fixture();
    let outcome =
        replay(&fixture.export, MemorySessionStore::new(), TimelineConfig::default(), None)
            .await
            .unwrap();

    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.timeline.order(), ["$1", "$2", "$3"]);
    for index in 0..3 {
        let row = outcome.timeline.row(index).unwrap();
        assert_eq!(row.decryption_failure, Some(DecryptionFailure::NoSession));
        assert_eq!(row.user_name, "Carol");
    }
}

#[tokio::test]
async fn imported_keys_decrypt_live_and_historical_rows() {
    let fixture = fixture();
    let sessions = MemorySessionStore::new();
    assert_eq!(import_session_keys(&sessions, &fixture.key_file).unwrap(), 1);

    let outcome =
        replay(&fixture.export, sessions, TimelineConfig::default(), None).await.unwrap();

    insta::assert_snapshot!(render_timeline(&outcome.timeline, utc(), today()), @r"
    == Monday, March 4 ==
    Carol <@carol:example.org>
      09:15 TextMessage first
      09:16 TextMessage second
      09:17 TextMessage third
    ");
}

#[tokio::test]
async fn keys_in_redb_are_used_after_reopen() {
    let fixture = fixture();
    let dir = tempdir().unwrap();
    let path = dir.path().join("sessions.redb");

    {
        let store = RedbSessionStore::open(&path).unwrap();
        import_session_keys(&store, &fixture.key_file).unwrap();
        assert_eq!(store.sessions().unwrap().len(), 1);
    }

    let store = RedbSessionStore::open(&path).unwrap();
    let config = TimelineConfig { memoize_decryption: true, ..TimelineConfig::default() };
    let outcome = replay(&fixture.export, store, config, Some(1)).await.unwrap();

    assert_eq!(outcome.pages, 1);
    assert!(outcome.timeline.has_more_history());
    let bodies: Vec<_> =
        (0..outcome.timeline.row_count()).map(|i| outcome.timeline.row(i).unwrap().body).collect();
    assert_eq!(bodies, ["second", "third"]);
}
