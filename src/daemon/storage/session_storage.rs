use std::{
    future::Future,
    io::{ErrorKind, SeekFrom},
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::utils::time::date_to_record_name;

use super::entities::{NewSession, SessionEntity, SessionId};

/// Write side of session persistence, used by the tracker.
pub trait SessionStore {
    /// Persists a new session with `end == start` and returns its id.
    fn create_session(&mut self, session: NewSession) -> impl Future<Output = Result<SessionId>>;

    /// Overwrites end time and duration of a previously created session. Writing the same
    /// values twice is harmless.
    fn update_session(
        &mut self,
        id: SessionId,
        end_time: DateTime<Utc>,
        duration: Duration,
    ) -> impl Future<Output = Result<()>>;
}

/// Read side of session persistence.
pub trait SessionHistory {
    /// Retrieves every session that started on a certain UTC day.
    fn sessions_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<SessionEntity>>> + Send;
}

impl<T: Deref> SessionHistory for T
where
    T::Target: SessionHistory,
{
    fn sessions_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<SessionEntity>>> + Send {
        self.deref().sessions_for(date)
    }
}

/// Session that can still be extended. Its line is always the last one written to `file`.
struct OpenSessionLine {
    entity: SessionEntity,
    file: File,
    offset: u64,
}

/// The main realization of [SessionStore] and [SessionHistory]. Sessions go into one
/// JSON-lines file per UTC day of their start time.
pub struct SessionStorageImpl {
    session_dir: PathBuf,
    open: Option<OpenSessionLine>,
}

impl SessionStorageImpl {
    pub fn new(session_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&session_dir)?;

        Ok(Self {
            session_dir,
            open: None,
        })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.session_dir.join(date_to_record_name(date))
    }

    /// Deletes every stored session. Returns how many day files were removed.
    pub async fn clear(&mut self) -> Result<usize> {
        self.open = None;
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.session_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn read_day(path: &Path) -> Result<Vec<SessionEntity>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<SessionEntity>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let mut reader = BufReader::new(file);
            let mut sessions = vec![];
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                let content = line.trim_ascii();
                if content.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<SessionEntity>(content) {
                    Ok(v) => sessions.push(v),
                    Err(e) => {
                        // A write cut off by a crash leaves a partial line behind.
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path,
                            String::from_utf8_lossy(content)
                        )
                    }
                }
            }

            reader.into_inner().unlock_async().await?;

            Ok(sessions)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e)?,
        }
    }

    /// Offset at which a new line can be appended. A partial last line left by a crash gets
    /// its newline first, so the new line is not glued onto it.
    async fn line_start(file: &mut File) -> Result<u64> {
        let end = file.seek(SeekFrom::End(0)).await?;
        if end == 0 {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(end - 1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        if last[0] == b'\n' {
            return Ok(end);
        }

        warn!("Terminating a partial line at the end of the day file");
        file.lock_exclusive()?;
        let result = async {
            file.seek(SeekFrom::Start(end)).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        file.unlock_async().await?;
        result?;
        Ok(end + 1)
    }

    async fn write_line(file: &mut File, offset: u64, entity: &SessionEntity) -> Result<()> {
        let mut buffer = serde_json::to_vec(entity)?;
        buffer.push(b'\n');

        file.lock_exclusive()?;
        let result = async {
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(&buffer).await?;
            file.flush().await?;
            // Truncating only after the new line is in place never leaves the row missing.
            file.set_len(offset + buffer.len() as u64).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        file.unlock_async().await?;
        Ok(result?)
    }
}

impl SessionStore for SessionStorageImpl {
    #[instrument(skip(self))]
    async fn create_session(&mut self, session: NewSession) -> Result<SessionId> {
        let entity = SessionEntity::open(Uuid::new_v4(), session);
        let path = self.day_path(entity.start_time.date_naive());

        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {path:?}"))?;

        let offset = Self::line_start(&mut file).await?;
        Self::write_line(&mut file, offset, &entity).await?;

        let id = entity.id;
        self.open = Some(OpenSessionLine {
            entity,
            file,
            offset,
        });
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn update_session(
        &mut self,
        id: SessionId,
        end_time: DateTime<Utc>,
        duration: Duration,
    ) -> Result<()> {
        let Some(open) = self.open.as_mut().filter(|v| v.entity.id == id) else {
            return Err(anyhow!("Session {id} is not open"));
        };

        open.entity.set_end(end_time);
        if open.entity.duration != duration {
            warn!(
                "Duration {duration} does not match the session span, storing {}",
                open.entity.duration
            );
        }
        Self::write_line(&mut open.file, open.offset, &open.entity).await
    }
}

impl SessionHistory for SessionStorageImpl {
    async fn sessions_for(&self, date: NaiveDate) -> Result<Vec<SessionEntity>> {
        Self::read_day(&self.day_path(date)).await
    }
}
