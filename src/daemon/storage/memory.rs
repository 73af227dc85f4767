use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use super::{
    entities::{NewSession, SessionEntity, SessionId},
    session_storage::{SessionHistory, SessionStore},
};

/// Keeps sessions in a vector and remembers every update it received.
#[derive(Default)]
pub struct MemoryStore {
    pub sessions: Vec<SessionEntity>,
    pub updates: Vec<(SessionId, DateTime<Utc>, Duration)>,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn updates_of(&self, id: SessionId) -> Vec<(DateTime<Utc>, Duration)> {
        self.updates
            .iter()
            .filter(|(v, _, _)| *v == id)
            .map(|(_, end, duration)| (*end, *duration))
            .collect()
    }
}

impl SessionStore for MemoryStore {
    async fn create_session(&mut self, session: NewSession) -> Result<SessionId> {
        if self.fail_writes {
            bail!("Storage is unavailable");
        }
        let entity = SessionEntity::open(Uuid::new_v4(), session);
        let id = entity.id;
        self.sessions.push(entity);
        Ok(id)
    }

    async fn update_session(
        &mut self,
        id: SessionId,
        end_time: DateTime<Utc>,
        duration: Duration,
    ) -> Result<()> {
        if self.fail_writes {
            bail!("Storage is unavailable");
        }
        let session = self
            .sessions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| anyhow!("Unknown session {id}"))?;
        session.set_end(end_time);
        self.updates.push((id, end_time, duration));
        Ok(())
    }
}

impl SessionHistory for MemoryStore {
    async fn sessions_for(&self, date: NaiveDate) -> Result<Vec<SessionEntity>> {
        Ok(self
            .sessions
            .iter()
            .filter(|v| v.start_time.date_naive() == date)
            .cloned()
            .collect())
    }
}
