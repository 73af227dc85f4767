use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::{
    classification::keys::continuity_key,
    daemon::storage::{
        entities::{NewSession, SessionId},
        session_storage::SessionStore,
    },
    window_api::ActiveWindowData,
};

/// Session being extended by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub id: SessionId,
    pub key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Wall time of the last write that reached the store.
    last_persisted: DateTime<Utc>,
}

impl OpenSession {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Turns active ticks into session records. Without an open session the arbiter is idle,
/// otherwise it is active on the open session's continuity key.
///
/// Extensions of an open session are written at most once per `debounce`. Closing writes
/// always go through.
pub struct SessionArbiter<S> {
    store: S,
    debounce: Duration,
    open: Option<OpenSession>,
}

impl<S: SessionStore> SessionArbiter<S> {
    pub fn new(store: S, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            open: None,
        }
    }

    pub fn open_session(&self) -> Option<&OpenSession> {
        self.open.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Closes the open session because the user went away. The session ends when input
    /// stopped, `idle_seconds` before `now`, unless that lies before its start.
    pub async fn close_idle(&mut self, now: DateTime<Utc>, idle_seconds: u64) {
        let Some(session) = self.open.take() else {
            return;
        };

        let idle = Duration::try_seconds(idle_seconds.try_into().unwrap_or(i64::MAX))
            .unwrap_or(Duration::MAX);
        let end = now
            .checked_sub_signed(idle)
            .filter(|corrected| *corrected > session.start)
            .unwrap_or(session.end);

        info!("Closing {} after {idle_seconds}s of inactivity", session.key);
        self.persist_final(&session, end).await;
    }

    /// Feeds one sample of an active tick. A new continuity key closes the open session and
    /// starts another one at `now`.
    pub async fn observe(&mut self, now: DateTime<Utc>, window: &ActiveWindowData) {
        let key = continuity_key(&window.app_name, &window.title, window.url.as_deref());

        if let Some(session) = self.open.take_if(|v| v.key != key) {
            debug!("Switching from {} to {key}", session.key);
            let end = session.end;
            self.persist_final(&session, end).await;
        }

        match self.open.as_mut() {
            Some(session) => {
                session.end = now.max(session.end);
                if now - session.last_persisted < self.debounce {
                    return;
                }
                match self
                    .store
                    .update_session(session.id, session.end, session.duration())
                    .await
                {
                    Ok(()) => session.last_persisted = now,
                    Err(e) => error!("Failed to extend session {} {e:?}", session.id),
                }
            }
            None => {
                let new_session = NewSession {
                    app_name: window.app_name.clone(),
                    title: window.title.clone(),
                    url: window.url.clone().unwrap_or_else(|| "".into()),
                    start_time: now,
                };
                match self.store.create_session(new_session).await {
                    Ok(id) => {
                        info!("Started {key}");
                        self.open = Some(OpenSession {
                            id,
                            key,
                            start: now,
                            end: now,
                            last_persisted: now,
                        });
                    }
                    Err(e) => error!("Failed to create session for {key} {e:?}"),
                }
            }
        }
    }

    async fn persist_final(&mut self, session: &OpenSession, end: DateTime<Utc>) {
        if let Err(e) = self
            .store
            .update_session(session.id, end, end - session.start)
            .await
        {
            error!("Failed to close session {} {e:?}", session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::{
        daemon::storage::memory::MemoryStore,
        utils::logging::TEST_LOGGING,
        window_api::ActiveWindowData,
    };

    use super::SessionArbiter;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap()
    }

    fn window(app_name: &str, title: &str, url: Option<&str>) -> ActiveWindowData {
        ActiveWindowData {
            app_name: app_name.into(),
            title: title.into(),
            url: url.map(Into::into),
        }
    }

    fn arbiter() -> SessionArbiter<MemoryStore> {
        SessionArbiter::new(MemoryStore::default(), Duration::milliseconds(900))
    }

    #[tokio::test]
    async fn test_same_key_extends_one_session() {
        *TEST_LOGGING;
        let mut arbiter = arbiter();
        let editor = window("Code.exe", "main.rs - dwell", None);

        for second in 0..10 {
            arbiter.observe(t0() + Duration::seconds(second), &editor).await;
        }

        let store = arbiter.store();
        assert_eq!(store.sessions.len(), 1);
        let session = &store.sessions[0];
        assert_eq!(session.start_time, t0());
        assert_eq!(session.end_time, t0() + Duration::seconds(9));
        assert_eq!(session.duration, Duration::seconds(9));

        let updates = store.updates_of(session.id);
        assert_eq!(updates.len(), 9);
        assert!(updates.windows(2).all(|v| v[0].1 <= v[1].1));
    }

    #[tokio::test]
    async fn test_extensions_are_debounced() {
        let mut arbiter = arbiter();
        let editor = window("Code.exe", "main.rs - dwell", None);

        for tick in 0..20 {
            arbiter.observe(t0() + Duration::milliseconds(300 * tick), &editor).await;
        }
        let id = arbiter.open_session().unwrap().id;

        let updates = arbiter.store().updates_of(id);
        assert!(!updates.is_empty());
        let mut previous = t0();
        for (end, _) in &updates {
            assert!(*end - previous >= Duration::milliseconds(900));
            previous = *end;
        }

        // The closing write doesn't wait for the debounce window.
        let last_tick = arbiter.open_session().unwrap().end;
        let other = window("Code.exe", "lib.rs - dwell", None);
        arbiter.observe(last_tick + Duration::milliseconds(100), &other).await;
        let updates = arbiter.store().updates_of(id);
        assert_eq!(updates.last().unwrap().0, last_tick);
        assert_eq!(updates.last().unwrap().1, last_tick - t0());
    }

    #[tokio::test]
    async fn test_key_change_rotates_sessions() {
        let mut arbiter = arbiter();
        let first = window(
            "chrome.exe",
            "Rust - Google Chrome",
            Some("https://www.rust-lang.org/"),
        );
        let second = window(
            "chrome.exe",
            "Crates - Google Chrome",
            Some("https://crates.io/"),
        );

        arbiter.observe(t0(), &first).await;
        arbiter.observe(t0() + Duration::seconds(1), &first).await;
        arbiter.observe(t0() + Duration::seconds(2), &second).await;

        let store = arbiter.store();
        assert_eq!(store.sessions.len(), 2);
        assert_eq!(store.sessions[0].end_time, t0() + Duration::seconds(1));
        assert_eq!(store.sessions[0].duration, Duration::seconds(1));
        assert_eq!(store.sessions[1].start_time, t0() + Duration::seconds(2));
        assert_eq!(&*store.sessions[1].url, "https://crates.io/");
        assert_eq!(
            arbiter.open_session().unwrap().key,
            "https://crates.io/:::Crates - Google Chrome"
        );
    }

    #[tokio::test]
    async fn test_idle_close_moves_end_back() {
        let mut arbiter = arbiter();
        let editor = window("Code.exe", "main.rs - dwell", None);
        for second in (0..=300).step_by(60) {
            arbiter.observe(t0() + Duration::seconds(second), &editor).await;
        }

        let now = t0() + Duration::seconds(300);
        arbiter.close_idle(now, 150).await;

        assert!(arbiter.open_session().is_none());
        let session = &arbiter.store().sessions[0];
        assert_eq!(session.end_time, now - Duration::milliseconds(150_000));
        assert_eq!(session.duration, session.end_time - session.start_time);
    }

    #[tokio::test]
    async fn test_idle_close_never_ends_before_start() {
        let mut arbiter = arbiter();
        let editor = window("Code.exe", "main.rs - dwell", None);
        arbiter.observe(t0(), &editor).await;
        arbiter.observe(t0() + Duration::seconds(10), &editor).await;

        arbiter.close_idle(t0() + Duration::seconds(20), 150).await;

        let session = &arbiter.store().sessions[0];
        assert_eq!(session.end_time, t0() + Duration::seconds(10));
        assert_eq!(session.duration, Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_idle_close_without_session_is_noop() {
        let mut arbiter = arbiter();
        arbiter.close_idle(t0(), 500).await;
        assert!(arbiter.store().sessions.is_empty());
        assert!(arbiter.store().updates.is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_is_retried_next_tick() {
        let mut arbiter = SessionArbiter::new(
            MemoryStore {
                fail_writes: true,
                ..Default::default()
            },
            Duration::milliseconds(900),
        );
        let editor = window("Code.exe", "main.rs - dwell", None);

        arbiter.observe(t0(), &editor).await;
        assert!(arbiter.open_session().is_none());

        arbiter.store.fail_writes = false;
        arbiter.observe(t0() + Duration::seconds(1), &editor).await;

        let session = arbiter.open_session().unwrap();
        assert_eq!(session.start, t0() + Duration::seconds(1));
        assert_eq!(arbiter.store().sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_extension_keeps_memory_state() {
        let mut arbiter = arbiter();
        let editor = window("Code.exe", "main.rs - dwell", None);
        arbiter.observe(t0(), &editor).await;

        arbiter.store.fail_writes = true;
        arbiter.observe(t0() + Duration::seconds(1), &editor).await;
        assert_eq!(arbiter.open_session().unwrap().duration(), Duration::seconds(1));

        arbiter.store.fail_writes = false;
        arbiter.observe(t0() + Duration::seconds(2), &editor).await;
        let id = arbiter.open_session().unwrap().id;
        assert_eq!(
            arbiter.store().updates_of(id),
            vec![(t0() + Duration::seconds(2), Duration::seconds(2))]
        );
    }
}
