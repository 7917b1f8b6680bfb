//! Ordered, deduplicated event storage for one room.

use std::collections::{HashMap, HashSet};

use crate::{LOG_UI, error::TimelineError, event::RoomEvent};

/// Rows added by one insertion, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedRange {
    /// First inserted row
    pub start: usize,
    /// Last inserted row
    pub end: usize,
}

impl InsertedRange {
    /// Number of rows in the range.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false; empty insertions produce no range.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Events of one room in chronological order.
///
/// # Invariants
///
/// - Every id in `order` has an entry in `by_id`, and vice versa
/// - No id appears twice in `order`
/// - `order` is oldest first, provided forward batches are newer than the
///   current tail and backward chunks are older than the current head
#[derive(Debug, Default, Clone)]
pub struct EventStore {
    by_id: HashMap<String, RoomEvent>,
    order: Vec<String>,
}

impl EventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// True if `event_id` is already stored.
    pub fn contains(&self, event_id: &str) -> bool {
        self.by_id.contains_key(event_id)
    }

    /// Event ids, oldest first.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Look up an event by id.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id is not stored
    pub fn get(&self, event_id: &str) -> Result<&RoomEvent, TimelineError> {
        self.by_id
            .get(event_id)
            .ok_or_else(|| TimelineError::NotFound { event_id: event_id.to_string() })
    }

    /// Event at `row`, if in range.
    pub fn event_at(&self, row: usize) -> Option<&RoomEvent> {
        self.order.get(row).and_then(|id| self.by_id.get(id))
    }

    /// Append a batch of newer events (oldest first) at the tail.
    ///
    /// Events already stored, or repeated within the batch, are skipped.
    /// Returns the inserted rows, or `None` if nothing was new.
    pub fn append_forward(&mut self, batch: Vec<RoomEvent>) -> Option<InsertedRange> {
        let fresh = self.take_fresh(batch);
        if fresh.is_empty() {
            return None;
        }

        let start = self.order.len();
        for event in fresh {
            self.order.push(event.event_id().to_string());
            self.by_id.insert(event.event_id().to_string(), event);
        }

        Some(InsertedRange { start, end: self.order.len() - 1 })
    }

    /// Prepend a chunk of older events at the head.
    ///
    /// `chunk` is newest first, as `/messages` returns it when paginating
    /// backwards; it is reversed so the store stays oldest first.
    pub fn prepend_backward(&mut self, chunk: Vec<RoomEvent>) -> Option<InsertedRange> {
        let fresh = self.take_fresh(chunk);
        if fresh.is_empty() {
            return None;
        }

        let count = fresh.len();
        let ids: Vec<String> = fresh.iter().rev().map(|e| e.event_id().to_string()).collect();
        self.order.splice(0..0, ids);
        for event in fresh {
            self.by_id.insert(event.event_id().to_string(), event);
        }

        Some(InsertedRange { start: 0, end: count - 1 })
    }

    /// Drop every stored event.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
    }

    fn take_fresh(&self, batch: Vec<RoomEvent>) -> Vec<RoomEvent> {
        let mut seen = HashSet::new();
        let total = batch.len();
        let fresh: Vec<RoomEvent> = batch
            .into_iter()
            .filter(|event| {
                !self.by_id.contains_key(event.event_id()) && seen.insert(event.event_id().to_string())
            })
            .collect();

        if fresh.len() < total {
            tracing::debug!(target: LOG_UI, skipped = total - fresh.len(), "skipping duplicate events");
        }
        fresh
    }
}
