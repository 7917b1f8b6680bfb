//! Drives a timeline through sync and backward pagination.

use backscroll_timeline::{
    GroupDecryptor, MemberProfiles, MessagesTransport, ProfileResolver, SessionStore, Timeline,
    TimelineConfig, TransportError,
};

use crate::{CliError, RoomExport};

/// Result of replaying an export.
pub struct ReplayOutcome<S: SessionStore> {
    /// Timeline holding every event that was loaded
    pub timeline: Timeline<S, MemberProfiles>,
    /// History pages applied
    pub pages: usize,
    /// Failure that stopped pagination early, if any
    pub error: Option<TransportError>,
}

/// Paginate backwards until history is exhausted, `max_pages` pages were
/// applied, or a request fails.
///
/// Requests are issued one at a time; each response is applied before the
/// next request is made. Failures are not retried. A page that inserts no
/// events and hands back the token it was requested with ends the run, since
/// repeating it would return the same page. Returns the number of pages
/// applied and the failure that stopped the run, if any.
pub async fn paginate<S, P, D, T>(
    timeline: &mut Timeline<S, P, D>,
    transport: &T,
    max_pages: Option<usize>,
) -> (usize, Option<TransportError>)
where
    S: SessionStore,
    P: ProfileResolver,
    D: GroupDecryptor,
    T: MessagesTransport,
{
    let mut pages = 0;
    while max_pages.is_none_or(|max| pages < max) {
        let Some(request) = timeline.fetch_older() else {
            break;
        };

        let result = transport.fetch_messages(&request.room_id, &request.from).await;
        let failure = result.as_ref().err().cloned();
        let inserted = timeline.apply_messages(request.generation, result);

        if failure.is_some() {
            return (pages, failure);
        }
        pages += 1;

        if inserted.is_none() && timeline.pagination_token() == Some(request.from.as_str()) {
            tracing::warn!(
                room_id = %request.room_id,
                from = %request.from,
                "pagination stalled: no new events and cursor unchanged"
            );
            break;
        }
    }
    (pages, None)
}

/// Load `export` into a fresh timeline backed by `sessions`.
pub async fn replay<S: SessionStore>(
    export: &RoomExport,
    sessions: S,
    config: TimelineConfig,
    max_pages: Option<usize>,
) -> Result<ReplayOutcome<S>, CliError> {
    let sync = export.sync_batch()?;
    let profiles = export.member_profiles(&sync);
    let mut timeline = Timeline::new(export.room_id.as_str(), sessions, profiles, config);

    timeline.add_events(sync);
    tracing::info!(room_id = %export.room_id, rows = timeline.row_count(), "initial sync loaded");

    let transport = export.transport();
    let (pages, error) = paginate(&mut timeline, &transport, max_pages).await;
    if let Some(error) = &error {
        tracing::warn!(%error, "history replay stopped early");
    }

    tracing::info!(
        room_id = %export.room_id,
        pages,
        rows = timeline.row_count(),
        exhausted = !timeline.has_more_history(),
        "history replay finished"
    );
    Ok(ReplayOutcome { timeline, pages, error })
}
