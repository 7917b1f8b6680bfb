//! Room exports and the transport that serves them.
//!
//! An export is one JSON document:
//!
//! ```json
//! {
//!   "room_id": "!room:example.org",
//!   "sync": { "events": [...], "prev_batch": "t1" },
//!   "history": { "t1": { "chunk": [...], "end": "t2" } },
//!   "profiles": { "@alice:example.org": { "displayname": "Alice" } }
//! }
//! ```
//!
//! `history` maps each pagination token to the `/messages` response a
//! homeserver would return for it.

use std::{
    collections::HashMap,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use backscroll_timeline::{
    MemberProfiles, MessagesBatch, MessagesTransport, SyncBatch, TransportError,
};
use serde::Deserialize;
use serde_json::Value;

use crate::CliError;

/// Parsed room export.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomExport {
    /// Room the export belongs to
    pub room_id: String,
    /// Room `timeline` object from the initial sync
    #[serde(default)]
    pub sync: Value,
    /// `/messages` responses keyed by the `from` token
    #[serde(default)]
    pub history: HashMap<String, Value>,
    /// Known member profiles keyed by user id
    #[serde(default)]
    pub profiles: HashMap<String, ExportedProfile>,
}

/// Member profile as stored in an export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportedProfile {
    /// Display name
    #[serde(default)]
    pub displayname: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl RoomExport {
    /// Parse an export from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse an export file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let json = std::fs::read_to_string(path)
            .map_err(|source| CliError::Read { path: path.display().to_string(), source })?;
        Self::from_json(&json)
    }

    /// The initial forward batch. An export without `sync` yields an empty
    /// batch with no pagination token.
    pub fn sync_batch(&self) -> Result<SyncBatch, CliError> {
        if self.sync.is_null() {
            return Ok(SyncBatch::default());
        }
        Ok(SyncBatch::from_json(self.sync.clone(), &self.room_id)?)
    }

    /// Profiles from the export, updated by member events in `sync`.
    pub fn member_profiles(&self, sync: &SyncBatch) -> MemberProfiles {
        let mut profiles = MemberProfiles::new();
        for (user_id, profile) in &self.profiles {
            profiles.set_profile(
                self.room_id.as_str(),
                user_id.as_str(),
                profile.displayname.clone(),
                profile.avatar_url.clone(),
            );
        }
        for event in &sync.events {
            profiles.observe(event);
        }
        profiles
    }

    /// Transport serving this export's history.
    pub fn transport(&self) -> FixtureTransport {
        FixtureTransport::new(self.room_id.clone(), self.history.clone())
    }
}

/// [`MessagesTransport`] answering from recorded `/messages` responses.
#[derive(Debug)]
pub struct FixtureTransport {
    room_id: String,
    pages: HashMap<String, Value>,
    requests: AtomicUsize,
}

impl FixtureTransport {
    /// Serve `pages` (keyed by `from` token) for `room_id`.
    pub fn new(room_id: impl Into<String>, pages: HashMap<String, Value>) -> Self {
        Self { room_id: room_id.into(), pages, requests: AtomicUsize::new(0) }
    }

    /// Number of requests answered so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn page(&self, room_id: &str, from: &str) -> Result<MessagesBatch, TransportError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if room_id != self.room_id {
            return Err(TransportError::new(
                "M_FORBIDDEN",
                format!("no history recorded for {room_id}"),
            ));
        }
        let page = self
            .pages
            .get(from)
            .ok_or_else(|| TransportError::new("M_NOT_FOUND", format!("unknown token {from}")))?;
        MessagesBatch::from_json(page.clone(), room_id)
            .map_err(|e| TransportError::new("M_BAD_JSON", e.to_string()))
    }
}

impl MessagesTransport for FixtureTransport {
    fn fetch_messages(
        &self,
        room_id: &str,
        from: &str,
    ) -> impl Future<Output = Result<MessagesBatch, TransportError>> + Send {
        let result = self.page(room_id, from);
        async move {
            tokio::task::yield_now().await;
            result
        }
    }
}
