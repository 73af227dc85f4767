use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    daemon::{config::TrackerConfig, probes::SignalSampler, storage::session_storage::SessionStore},
    utils::clock::Clock,
    window_api::WindowObserver,
};

use super::{
    arbiter::SessionArbiter,
    feed::{backfill, FeedReader},
    idle::IdleEvaluator,
};

/// The polling loop. Every tick reads the signals, decides whether the user is idle and hands
/// the focused window to the [SessionArbiter]. The next tick is scheduled only once the
/// previous one finished, so ticks never overlap.
pub struct ActivityTracker<S> {
    arbiter: SessionArbiter<S>,
    sampler: SignalSampler,
    observer: Box<dyn WindowObserver>,
    feed: FeedReader,
    idle_evaluator: IdleEvaluator,
    feed_max_age: Option<chrono::Duration>,
    tick_interval: Duration,
    clock: Box<dyn Clock>,
    shutdown: CancellationToken,
}

impl<S: SessionStore> ActivityTracker<S> {
    pub fn new(
        config: &TrackerConfig,
        arbiter: SessionArbiter<S>,
        sampler: SignalSampler,
        observer: Box<dyn WindowObserver>,
        feed: FeedReader,
        clock: Box<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            arbiter,
            sampler,
            observer,
            feed,
            idle_evaluator: IdleEvaluator::from_seconds(config.idle_threshold_secs),
            feed_max_age: config.browser_feed_max_age(),
            tick_interval: config.tick_interval(),
            clock,
            shutdown,
        }
    }

    pub fn arbiter(&self) -> &SessionArbiter<S> {
        &self.arbiter
    }

    /// One pass of the loop. Nothing in here fails: broken probes read as absent signals, a
    /// missing window skips the tick and storage errors are logged by the arbiter.
    pub async fn tick(&mut self) {
        let signals = self.sampler.sample(self.clock.instant()).await;
        let now = self.clock.time();

        if self.idle_evaluator.is_idle(&signals) {
            debug!("Idle for {}s", signals.idle_seconds);
            self.arbiter.close_idle(now, signals.idle_seconds).await;
            return;
        }

        let window = match self.observer.active_window() {
            Ok(Some(v)) => v,
            Ok(None) => {
                debug!("No focused window");
                return;
            }
            Err(e) => {
                warn!("Failed to read the focused window {e:?}");
                return;
            }
        };

        let window = backfill(window, self.feed.latest().as_ref(), now, self.feed_max_age);
        self.arbiter.observe(now, &window).await;
    }

    /// Executes the tracker event loop. Shutdown is only observed between ticks, so a tick
    /// that already started always finishes its storage write.
    pub async fn run(mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let mut tick_point = self.clock.instant();
        loop {
            self.tick().instrument(info_span!("tick")).await;

            // A slow tick pushes the schedule back instead of firing a burst of late ticks.
            tick_point = (tick_point + self.tick_interval).max(self.clock.instant());

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = self.clock.sleep_until(tick_point) => (),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            collection::{arbiter::SessionArbiter, feed::BrowserFeed},
            config::TrackerConfig,
            probes::{
                GamepadState, MockGamepadProbe, MockIdleProbe, MockMediaProbe, NoSignal,
                SignalSampler,
            },
            storage::{
                memory::MemoryStore,
                session_storage::{SessionHistory, SessionStorageImpl},
            },
        },
        utils::{clock::TestClock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowObserver},
    };

    use super::ActivityTracker;

    fn editor() -> ActiveWindowData {
        ActiveWindowData {
            app_name: "Code.exe".into(),
            title: "main.rs - dwell".into(),
            url: None,
        }
    }

    fn sampler(idle_seconds: u64, media_playing: bool, gamepad_active: bool) -> SignalSampler {
        let mut idle = MockIdleProbe::new();
        idle.expect_idle_seconds().returning(move || idle_seconds);
        let mut gamepad = MockGamepadProbe::new();
        gamepad.expect_gamepad_state().returning(move || GamepadState {
            connected: gamepad_active,
            active: gamepad_active,
        });
        let mut media = MockMediaProbe::new();
        media.expect_is_playing().returning(move || media_playing);
        SignalSampler::new(
            Box::new(idle),
            Box::new(gamepad),
            Box::new(media),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
    }

    fn quiet_sampler() -> SignalSampler {
        SignalSampler::new(
            Box::new(NoSignal),
            Box::new(NoSignal),
            Box::new(NoSignal),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
    }

    fn tracker(
        sampler: SignalSampler,
        observer: MockWindowObserver,
        feed: &BrowserFeed,
    ) -> ActivityTracker<MemoryStore> {
        let config = TrackerConfig::default();
        ActivityTracker::new(
            &config,
            SessionArbiter::new(MemoryStore::default(), config.debounce()),
            sampler,
            Box::new(observer),
            feed.reader(),
            Box::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap(),
            )),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tick_closes_without_sampling_window() {
        *TEST_LOGGING;
        let mut observer = MockWindowObserver::new();
        observer.expect_active_window().times(1).returning(|| Ok(Some(editor())));
        let feed = BrowserFeed::new();

        let mut tracker = tracker(quiet_sampler(), observer, &feed);
        tracker.tick().await;
        assert!(tracker.arbiter().open_session().is_some());

        tracker.sampler = sampler(300, false, false);
        tracker.tick().await;
        assert!(tracker.arbiter().open_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_and_gamepad_keep_session_open() {
        for (media, gamepad) in [(true, false), (false, true)] {
            let mut observer = MockWindowObserver::new();
            observer.expect_active_window().times(2).returning(|| Ok(Some(editor())));
            let feed = BrowserFeed::new();

            let mut tracker = tracker(sampler(300, media, gamepad), observer, &feed);
            tracker.tick().await;
            tokio::time::advance(Duration::from_secs(1)).await;
            tracker.tick().await;

            let session = tracker.arbiter().open_session().unwrap();
            assert_eq!(session.duration(), chrono::Duration::seconds(1));
            assert_eq!(tracker.arbiter().store().sessions.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_failures_skip_the_tick() {
        let mut observer = MockWindowObserver::new();
        let mut answers = vec![
            Ok(Some(editor())),
            Err(anyhow!("Screen is locked")),
            Ok(None),
            Ok(Some(editor())),
        ]
        .into_iter();
        observer
            .expect_active_window()
            .times(4)
            .returning(move || answers.next().unwrap());
        let feed = BrowserFeed::new();

        let mut tracker = tracker(quiet_sampler(), observer, &feed);
        for _ in 0..4 {
            tracker.tick().await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        let store = tracker.arbiter().store();
        assert_eq!(store.sessions.len(), 1);
        assert_eq!(store.sessions[0].duration, chrono::Duration::seconds(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_browser_feed_fills_in_url() {
        let mut observer = MockWindowObserver::new();
        observer.expect_active_window().returning(|| {
            Ok(Some(ActiveWindowData {
                app_name: "chrome.exe".into(),
                title: "Google Chrome".into(),
                url: None,
            }))
        });
        let feed = BrowserFeed::new();
        feed.push(
            "https://www.bilibili.com/video/xyz",
            Some("Some Video - bilibili"),
            Utc::now(),
        );

        let mut tracker = tracker(quiet_sampler(), observer, &feed);
        tracker.tick().await;

        let stored = &tracker.arbiter().store().sessions[0];
        assert_eq!(&*stored.url, "https://www.bilibili.com/video/xyz");
        assert_eq!(&*stored.title, "Some Video - bilibili");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_shutdown() {
        let mut observer = MockWindowObserver::new();
        observer
            .expect_active_window()
            .times(6)
            .returning(|| Ok(Some(editor())));
        let feed = BrowserFeed::new();
        let tracker = tracker(quiet_sampler(), observer, &feed);
        let shutdown = tracker.shutdown.clone();

        let (result, _) = tokio::join!(tracker.run(), async {
            tokio::time::sleep(Duration::from_millis(5500)).await;
            shutdown.cancel();
        });
        result.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_during_tick_keeps_the_write() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = TrackerConfig::default();
        let shutdown = CancellationToken::new();

        // Shutdown arrives while the tick is running, before the session reaches the disk
        let cancel = shutdown.clone();
        let mut observer = MockWindowObserver::new();
        observer.expect_active_window().times(1).returning(move || {
            cancel.cancel();
            Ok(Some(editor()))
        });
        let feed = BrowserFeed::new();

        let tracker = ActivityTracker::new(
            &config,
            SessionArbiter::new(SessionStorageImpl::new(dir.path().to_owned())?, config.debounce()),
            quiet_sampler(),
            Box::new(observer),
            feed.reader(),
            Box::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap(),
            )),
            shutdown,
        );
        tracker.run().await?;

        let stored = SessionStorageImpl::new(dir.path().to_owned())?
            .sessions_for(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap())
            .await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(&*stored[0].app_name, "Code.exe");
        Ok(())
    }
}
