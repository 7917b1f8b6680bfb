//! Backward pagination: at most one `/messages` request in flight per room.
//!
//! The controller is a small state machine. [`fetch_older`] hands out a
//! [`FetchRequest`] and moves to [`PaginationState::FetchInFlight`];
//! [`complete`] consumes the response and returns to idle. Every request is
//! stamped with a generation so responses that outlive a [`reset`] are
//! recognised and dropped.
//!
//! ```text
//!            fetch_older (cursor set)
//!   ┌──────┐ ─────────────────────────► ┌───────────────┐
//!   │ Idle │                            │ FetchInFlight │
//!   └──────┘ ◄───────────────────────── └───────────────┘
//!              complete (ok or error)
//! ```
//!
//! [`fetch_older`]: PaginationController::fetch_older
//! [`complete`]: PaginationController::complete
//! [`reset`]: PaginationController::reset

use crate::{LOG_NET, LOG_UI, error::TransportError, event::RoomEvent, transport::MessagesBatch};

/// Pagination state for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    /// No request outstanding
    Idle,
    /// A request for `generation` is outstanding
    FetchInFlight {
        /// Generation the request was issued under
        generation: u64,
    },
}

/// A `/messages` request the runtime should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Room to paginate
    pub room_id: String,
    /// Pagination token to fetch from
    pub from: String,
    /// Generation to echo back with the response
    pub generation: u64,
}

/// What to do with a completed request.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationOutcome {
    /// Prepend these events (newest first)
    Apply(Vec<RoomEvent>),
    /// The request failed; nothing to insert
    Failed(TransportError),
    /// Response belongs to an earlier generation or no request was pending
    Stale,
}

/// Single-flight backward pagination.
#[derive(Debug, Clone)]
pub struct PaginationController {
    room_id: String,
    state: PaginationState,
    cursor: Option<String>,
    generation: u64,
}

impl PaginationController {
    /// Create an idle controller with no cursor.
    pub fn new(room_id: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), state: PaginationState::Idle, cursor: None, generation: 0 }
    }

    /// Current state.
    pub fn state(&self) -> PaginationState {
        self.state
    }

    /// True while a request is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, PaginationState::FetchInFlight { .. })
    }

    /// Token the next request will start from.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while older history may exist.
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// Record the token from the first sync batch.
    pub fn set_cursor(&mut self, cursor: Option<String>) {
        self.cursor = cursor;
    }

    /// Start fetching older history.
    ///
    /// Returns `None` without side effects if a request is already in
    /// flight or there is no cursor to paginate from.
    pub fn fetch_older(&mut self) -> Option<FetchRequest> {
        if self.is_in_flight() {
            tracing::warn!(target: LOG_UI, room_id = %self.room_id, "Already loading older messages");
            return None;
        }

        let Some(from) = self.cursor.clone() else {
            tracing::info!(target: LOG_UI, room_id = %self.room_id, "no older history to fetch");
            return None;
        };

        tracing::info!(target: LOG_UI, room_id = %self.room_id, from = %from, "Paginating room");
        self.state = PaginationState::FetchInFlight { generation: self.generation };

        Some(FetchRequest { room_id: self.room_id.clone(), from, generation: self.generation })
    }

    /// Consume the response to a [`FetchRequest`].
    ///
    /// On success the cursor moves to the response's `end`. Either way the
    /// controller returns to idle; failures are logged and never retried.
    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<MessagesBatch, TransportError>,
    ) -> PaginationOutcome {
        if self.state != (PaginationState::FetchInFlight { generation }) {
            tracing::warn!(
                target: LOG_UI,
                room_id = %self.room_id,
                generation,
                current = self.generation,
                "dropping stale pagination response"
            );
            return PaginationOutcome::Stale;
        }

        self.state = PaginationState::Idle;

        match result {
            Ok(batch) => {
                tracing::debug!(
                    target: LOG_UI,
                    room_id = %self.room_id,
                    events = batch.chunk.len(),
                    exhausted = batch.end.is_none(),
                    "received older messages"
                );
                self.cursor = batch.end;
                PaginationOutcome::Apply(batch.chunk)
            },
            Err(error) => {
                tracing::error!(
                    target: LOG_NET,
                    room_id = %self.room_id,
                    errcode = %error.errcode,
                    message = %error.message,
                    "failed to call /messages"
                );
                PaginationOutcome::Failed(error)
            },
        }
    }

    /// Forget the cursor and any outstanding request.
    ///
    /// Bumps the generation so a response still on the wire is discarded.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = PaginationState::Idle;
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: &str = "!room:example.org";

    fn controller_with_cursor(cursor: &str) -> PaginationController {
        let mut controller = PaginationController::new(ROOM);
        controller.set_cursor(Some(cursor.to_string()));
        controller
    }

    #[test]
    fn no_cursor_means_no_request() {
        let mut controller = PaginationController::new(ROOM);

        assert_eq!(controller.fetch_older(), None);
        assert_eq!(controller.state(), PaginationState::Idle);
    }

    #[test]
    fn second_fetch_while_in_flight_is_ignored() {
        let mut controller = controller_with_cursor("t1");

        let request = controller.fetch_older().unwrap();
        assert_eq!(request.from, "t1");
        assert_eq!(request.room_id, ROOM);
        assert!(controller.is_in_flight());

        assert_eq!(controller.fetch_older(), None);
        assert_eq!(controller.state(), PaginationState::FetchInFlight { generation: 0 });
    }

    #[test]
    fn success_advances_cursor_and_returns_to_idle() {
        let mut controller = controller_with_cursor("t1");
        let request = controller.fetch_older().unwrap();

        let outcome = controller.complete(
            request.generation,
            Ok(MessagesBatch { chunk: Vec::new(), end: Some("t0".to_string()) }),
        );

        assert_eq!(outcome, PaginationOutcome::Apply(Vec::new()));
        assert_eq!(controller.cursor(), Some("t0"));
        assert_eq!(controller.state(), PaginationState::Idle);
    }

    #[test]
    fn exhausted_history_clears_cursor() {
        let mut controller = controller_with_cursor("t1");
        let request = controller.fetch_older().unwrap();

        controller.complete(request.generation, Ok(MessagesBatch::default()));

        assert!(!controller.has_more());
        assert_eq!(controller.fetch_older(), None);
    }

    #[test]
    fn failure_keeps_cursor_and_allows_new_attempt() {
        let mut controller = controller_with_cursor("t1");
        let request = controller.fetch_older().unwrap();

        let outcome =
            controller.complete(request.generation, Err(TransportError::new("M_FORBIDDEN", "no")));

        assert!(matches!(outcome, PaginationOutcome::Failed(e) if e.errcode == "M_FORBIDDEN"));
        assert_eq!(controller.cursor(), Some("t1"));
        assert_eq!(controller.fetch_older().map(|r| r.from), Some("t1".to_string()));
    }

    #[test]
    fn response_after_reset_is_stale() {
        let mut controller = controller_with_cursor("t1");
        let request = controller.fetch_older().unwrap();

        controller.reset();
        let outcome = controller.complete(
            request.generation,
            Ok(MessagesBatch { chunk: Vec::new(), end: Some("t0".to_string()) }),
        );

        assert_eq!(outcome, PaginationOutcome::Stale);
        assert_eq!(controller.cursor(), None);
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn unsolicited_response_is_stale() {
        let mut controller = controller_with_cursor("t1");

        assert_eq!(controller.complete(0, Ok(MessagesBatch::default())), PaginationOutcome::Stale);
        assert_eq!(controller.cursor(), Some("t1"));
    }
}
