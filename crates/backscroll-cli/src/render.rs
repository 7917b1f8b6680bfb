//! Plain-text rendering of timeline rows.
//!
//! One line per row, with a date line whenever the local day changes and a
//! sender line whenever the section changes.

use backscroll_timeline::{
    GroupDecryptor, ProfileResolver, SessionStore, Timeline, TimelineRow,
    projection::{UNKNOWN_SIZE, format_date_separator},
};
use chrono::{FixedOffset, NaiveDate};

/// Render one row: local time, kind, body and media details.
pub fn render_row(row: &TimelineRow, offset: FixedOffset) -> String {
    let time = row.timestamp.with_timezone(&offset).format("%H:%M");
    let line = format!("  {time} {:?} {}", row.kind, row.body);
    match (row.url.as_str(), row.width) {
        ("", _) => line,
        (url, UNKNOWN_SIZE) => format!("{line} ({url})"),
        (url, width) => format!("{line} ({url} {width}x{})", row.height),
    }
}

/// Render every row of `timeline`.
///
/// `today` decides whether date lines carry the year.
pub fn render_timeline<S, P, D>(
    timeline: &Timeline<S, P, D>,
    offset: FixedOffset,
    today: NaiveDate,
) -> String
where
    S: SessionStore,
    P: ProfileResolver,
    D: GroupDecryptor,
{
    let mut lines = Vec::new();
    let mut last_day = None;
    let mut last_section = None;

    for index in 0..timeline.row_count() {
        let Some(row) = timeline.row(index) else {
            break;
        };

        let day = row.timestamp.with_timezone(&offset).date_naive();
        if last_day != Some(day) {
            lines.push(format!("== {} ==", format_date_separator(day, today)));
            last_day = Some(day);
        }
        if last_section.as_ref() != Some(&row.section) {
            lines.push(format!("{} <{}>", row.user_name, row.user_id));
            last_section = Some(row.section.clone());
        }
        lines.push(render_row(&row, offset));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use backscroll_store::MemorySessionStore;
    use backscroll_timeline::{MemberProfiles, SyncBatch, TimelineConfig, parse_timeline_events};
    use serde_json::json;

    use super::*;

    const ROOM: &str = "!room:x";

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day_one_and_two() -> SyncBatch {
        let events = parse_timeline_events(
            [
                json!({
                    "event_id": "$1", "sender": "@alice:x", "origin_server_ts": 1_709_543_700_000u64,
                    "type": "m.room.message",
                    "content": { "msgtype": "m.text", "body": "morning" },
                }),
                json!({
                    "event_id": "$2", "sender": "@alice:x", "origin_server_ts": 1_709_543_760_000u64,
                    "type": "m.room.message",
                    "content": {
                        "msgtype": "m.image", "body": "cat.png", "url": "mxc://x/cat",
                        "info": { "w": 640, "h": 480 },
                    },
                }),
                json!({
                    "event_id": "$3", "sender": "@bob:x", "origin_server_ts": 1_709_544_600_000u64,
                    "type": "m.room.message",
                    "content": { "msgtype": "m.text", "body": "hi alice" },
                }),
                json!({
                    "event_id": "$4", "sender": "@bob:x", "origin_server_ts": 1_709_625_600_000u64,
                    "type": "m.room.message",
                    "content": { "msgtype": "m.notice", "body": "next day" },
                }),
            ],
            ROOM,
        );
        SyncBatch { events, prev_batch: None }
    }

    #[test]
    fn renders_days_and_sections() {
        let mut profiles = MemberProfiles::new();
        profiles.set_profile(ROOM, "@alice:x", Some("Alice".to_string()), None);
        let mut timeline =
            Timeline::new(ROOM, MemorySessionStore::new(), profiles, TimelineConfig::default());
        timeline.add_events(day_one_and_two());

        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let rendered = render_timeline(&timeline, utc(), today);

        insta::assert_snapshot!(rendered, @r"
        == Monday, March 4 ==
        Alice <@alice:x>
          09:15 TextMessage morning
          09:16 ImageMessage cat.png (mxc://x/cat 640x480)
        @bob:x <@bob:x>
          09:30 TextMessage hi alice
        == Tuesday, March 5 ==
        @bob:x <@bob:x>
          08:00 NoticeMessage next day
        ");
    }

    #[test]
    fn offset_shifts_times() {
        let mut timeline = Timeline::new(
            ROOM,
            MemorySessionStore::new(),
            MemberProfiles::new(),
            TimelineConfig::default(),
        );
        timeline.add_events(day_one_and_two());

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let row = timeline.row(0).unwrap();
        assert_eq!(render_row(&row, plus_two), "  11:15 TextMessage morning");
    }

    #[test]
    fn empty_timeline_renders_nothing() {
        let timeline = Timeline::new(
            ROOM,
            MemorySessionStore::new(),
            MemberProfiles::new(),
            TimelineConfig::default(),
        );
        assert_eq!(render_timeline(&timeline, utc(), NaiveDate::default()), "");
    }
}
