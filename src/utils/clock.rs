use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock timestamps and monotonic instants for the tracker. Session boundaries
/// use [Clock::time], probe throttling and tick scheduling use [Clock::instant], which lets
/// tests swap both out.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

/// Returns whether more than `interval` passed between `previous` and `now`. Exactly `interval`
/// is not enough. A missing previous moment always counts as elapsed.
pub fn has_elapsed(previous: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match previous {
        Some(previous) => now.saturating_duration_since(previous) > interval,
        None => true,
    }
}

/// Wall time that starts at a fixed moment and then follows tokio's clock, so pausing and
/// advancing tokio time moves it as well.
#[cfg(test)]
pub struct TestClock {
    start_time: DateTime<Utc>,
    reference: Instant,
}

#[cfg(test)]
impl TestClock {
    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            reference: Instant::now(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for TestClock {
    fn time(&self) -> DateTime<Utc> {
        self.start_time + self.reference.elapsed()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
