use std::{future, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, Stream, StreamExt, TryStreamExt};
use tracing::error;

use super::{
    entities::{SessionEntity, VisitEntity},
    session_storage::SessionHistory,
};

/// Inclusive range of session start times.
#[derive(Debug, Clone, Copy)]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryRange {
    fn contains(&self, session: &SessionEntity) -> bool {
        self.start <= session.start_time && session.start_time <= self.end
    }
}

/// Streams every session that started inside `range`. Day files are read a few at a time.
pub fn extract_between(
    storage: impl SessionHistory,
    range: QueryRange,
) -> impl Stream<Item = Result<SessionEntity>> {
    let storage = Arc::new(storage);

    let files = date_range(range.start.date_naive(), range.end.date_naive())
        .map(move |day| {
            let storage = storage.clone();
            async move { (day, storage.sessions_for(day).await) }
        })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .try_filter(move |session| future::ready(range.contains(session)))
}

/// Rows consumed by aggregation.
pub async fn query_visits(
    storage: impl SessionHistory,
    range: QueryRange,
) -> Result<Vec<VisitEntity>> {
    extract_between(storage, range)
        .map_ok(VisitEntity::from)
        .try_collect()
        .await
}

/// Full sessions, newest first.
pub async fn history(
    storage: impl SessionHistory,
    range: QueryRange,
    limit: usize,
) -> Result<Vec<SessionEntity>> {
    let mut sessions: Vec<SessionEntity> = extract_between(storage, range).try_collect().await?;
    sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    sessions.truncate(limit);
    Ok(sessions)
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold(Some(start), move |current| {
        future::ready(match current {
            Some(day) if day <= end => Some((day, day.succ_opt())),
            _ => None,
        })
    })
}
