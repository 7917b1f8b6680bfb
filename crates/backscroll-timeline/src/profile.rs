//! Display names and avatars for room members.

use std::collections::HashMap;

use crate::event::{EventContent, RoomEvent};

/// Resolves user ids to what the UI shows for them.
pub trait ProfileResolver {
    /// Display name of `user_id` in `room_id`, or the user id itself.
    fn display_name(&self, room_id: &str, user_id: &str) -> String;

    /// Avatar URL of `user_id` in `room_id`, or an empty string.
    fn avatar_url(&self, room_id: &str, user_id: &str) -> String;
}

impl<T: ProfileResolver + ?Sized> ProfileResolver for &T {
    fn display_name(&self, room_id: &str, user_id: &str) -> String {
        (**self).display_name(room_id, user_id)
    }

    fn avatar_url(&self, room_id: &str, user_id: &str) -> String {
        (**self).avatar_url(room_id, user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Profile {
    display_name: Option<String>,
    avatar_url: Option<String>,
}

/// In-memory member profiles keyed by (room, user).
#[derive(Debug, Clone, Default)]
pub struct MemberProfiles {
    profiles: HashMap<(String, String), Profile>,
}

impl MemberProfiles {
    /// Create an empty profile table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a member's profile, replacing whatever was known.
    pub fn set_profile(
        &mut self,
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) {
        self.profiles
            .insert((room_id.into(), user_id.into()), Profile { display_name, avatar_url });
    }

    /// Learn from an `m.room.member` event. Other events are ignored.
    ///
    /// Applies in the order events are observed, so feed events oldest first.
    pub fn observe(&mut self, event: &RoomEvent) {
        let EventContent::Member { state_key, content } = event.content() else {
            return;
        };

        let key = (event.room_id().to_string(), state_key.clone());
        if content.membership == "join" || content.membership == "invite" {
            self.profiles.insert(
                key,
                Profile {
                    display_name: content.displayname.clone(),
                    avatar_url: content.avatar_url.clone(),
                },
            );
        } else {
            self.profiles.remove(&key);
        }
    }

    /// Number of known profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// True if no profiles are known.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn lookup(&self, room_id: &str, user_id: &str) -> Option<&Profile> {
        self.profiles.get(&(room_id.to_string(), user_id.to_string()))
    }
}

impl ProfileResolver for MemberProfiles {
    fn display_name(&self, room_id: &str, user_id: &str) -> String {
        self.lookup(room_id, user_id)
            .and_then(|p| p.display_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user_id.to_string())
    }

    fn avatar_url(&self, room_id: &str, user_id: &str) -> String {
        self.lookup(room_id, user_id).and_then(|p| p.avatar_url.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::event::parse_timeline_event;

    const ROOM: &str = "!room:example.org";

    fn member(user: &str, membership: &str, name: Option<&str>) -> RoomEvent {
        parse_timeline_event(
            json!({
                "event_id": format!("$member-{user}-{membership}"),
                "sender": user,
                "state_key": user,
                "origin_server_ts": 1,
                "type": "m.room.member",
                "content": { "membership": membership, "displayname": name, "avatar_url": "mxc://a/b" },
            }),
            ROOM,
        )
        .unwrap()
    }

    #[test]
    fn unknown_user_falls_back_to_user_id() {
        let profiles = MemberProfiles::new();

        assert_eq!(profiles.display_name(ROOM, "@bob:example.org"), "@bob:example.org");
        assert_eq!(profiles.avatar_url(ROOM, "@bob:example.org"), "");
    }

    #[test]
    fn join_event_sets_profile() {
        let mut profiles = MemberProfiles::new();
        profiles.observe(&member("@alice:example.org", "join", Some("Alice")));

        assert_eq!(profiles.display_name(ROOM, "@alice:example.org"), "Alice");
        assert_eq!(profiles.avatar_url(ROOM, "@alice:example.org"), "mxc://a/b");
        assert_eq!(profiles.display_name("!other:example.org", "@alice:example.org"), "@alice:example.org");
    }

    #[test]
    fn leave_forgets_profile() {
        let mut profiles = MemberProfiles::new();
        profiles.observe(&member("@alice:example.org", "join", Some("Alice")));
        profiles.observe(&member("@alice:example.org", "leave", None));

        assert_eq!(profiles.display_name(ROOM, "@alice:example.org"), "@alice:example.org");
        assert!(profiles.is_empty());
    }

    #[test]
    fn empty_display_name_falls_back() {
        let mut profiles = MemberProfiles::new();
        profiles.set_profile(ROOM, "@carol:example.org", Some(String::new()), None);

        assert_eq!(profiles.display_name(ROOM, "@carol:example.org"), "@carol:example.org");
    }
}
