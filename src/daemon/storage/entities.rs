use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = Uuid;

/// One line of a day file: a block of continuous attention on one application or page.
/// `end_time >= start_time` and `duration == end_time - start_time` always hold.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct SessionEntity {
    pub id: SessionId,
    pub app_name: Arc<str>,
    pub title: Arc<str>,
    /// Empty when the page address was unknown.
    #[serde(default = "empty_str")]
    pub url: Arc<str>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

fn empty_str() -> Arc<str> {
    "".into()
}

impl SessionEntity {
    pub fn open(id: SessionId, session: NewSession) -> Self {
        Self {
            id,
            app_name: session.app_name,
            title: session.title,
            url: session.url,
            start_time: session.start_time,
            end_time: session.start_time,
            duration: Duration::zero(),
        }
    }

    /// Moves the end of the session, keeping duration in sync. Ends before the start are
    /// clamped to the start.
    pub fn set_end(&mut self, end: DateTime<Utc>) {
        self.end_time = end.max(self.start_time);
        self.duration = self.end_time - self.start_time;
    }

    pub fn url(&self) -> Option<&str> {
        (!self.url.is_empty()).then_some(&*self.url)
    }
}

/// Data needed to open a session. The store assigns the id and starts with `end == start`.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NewSession {
    pub app_name: Arc<str>,
    pub title: Arc<str>,
    pub url: Arc<str>,
    pub start_time: DateTime<Utc>,
}

/// The part of a session aggregation cares about.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct VisitEntity {
    pub app_name: Arc<str>,
    pub title: Arc<str>,
    pub url: Arc<str>,
    pub duration: Duration,
}

impl From<SessionEntity> for VisitEntity {
    fn from(
        SessionEntity {
            app_name,
            title,
            url,
            duration,
            ..
        }: SessionEntity,
    ) -> Self {
        VisitEntity {
            app_name,
            title,
            url,
            duration,
        }
    }
}

mod duration_ms {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(ms))
    }
}
