//! Signals deciding whether the user is present besides keyboard and mouse input.
//!
//! Every probe fails open: a missing helper, a timeout or garbage output resolve to "signal
//! absent" (not idle, no gamepad, no media) so a broken probe can't corrupt session state.

pub mod gamepad;
pub mod idle;
pub mod media;

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::time::Instant;

use crate::utils::clock::has_elapsed;

/// Seconds since the last keyboard or mouse input.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdleProbe: Send + Sync {
    async fn idle_seconds(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamepadState {
    pub connected: bool,
    pub active: bool,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait GamepadProbe: Send + Sync {
    async fn gamepad_state(&self) -> GamepadState;
}

/// Whether any media is currently playing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn is_playing(&self) -> bool;
}

/// Stands in for probes that aren't configured.
pub struct NoSignal;

#[async_trait]
impl IdleProbe for NoSignal {
    async fn idle_seconds(&self) -> u64 {
        0
    }
}

#[async_trait]
impl GamepadProbe for NoSignal {
    async fn gamepad_state(&self) -> GamepadState {
        GamepadState::default()
    }
}

#[async_trait]
impl MediaProbe for NoSignal {
    async fn is_playing(&self) -> bool {
        false
    }
}

/// Readings of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub idle_seconds: u64,
    pub media_playing: bool,
    pub gamepad_active: bool,
}

/// Reuses the last value of an expensive signal until `interval` passes.
#[derive(Debug)]
pub struct Throttled<T> {
    interval: Duration,
    last: Option<(Instant, T)>,
}

impl<T: Copy> Throttled<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn fresh(&self, now: Instant) -> Option<T> {
        self.last
            .filter(|(at, _)| !has_elapsed(Some(*at), now, self.interval))
            .map(|(_, value)| value)
    }

    pub fn store(&mut self, now: Instant, value: T) -> T {
        self.last = Some((now, value));
        value
    }
}

/// Reads all probes once per tick. Idle time is read every time; gamepad and media readings
/// are throttled.
pub struct SignalSampler {
    idle: Box<dyn IdleProbe>,
    gamepad: Box<dyn GamepadProbe>,
    media: Box<dyn MediaProbe>,
    gamepad_cache: Throttled<GamepadState>,
    media_cache: Throttled<bool>,
}

impl SignalSampler {
    pub fn new(
        idle: Box<dyn IdleProbe>,
        gamepad: Box<dyn GamepadProbe>,
        media: Box<dyn MediaProbe>,
        gamepad_interval: Duration,
        media_interval: Duration,
    ) -> Self {
        Self {
            idle,
            gamepad,
            media,
            gamepad_cache: Throttled::new(gamepad_interval),
            media_cache: Throttled::new(media_interval),
        }
    }

    pub async fn sample(&mut self, now: Instant) -> Signals {
        let idle_seconds = self.idle.idle_seconds().await;

        let gamepad = match self.gamepad_cache.fresh(now) {
            Some(v) => v,
            None => {
                let v = self.gamepad.gamepad_state().await;
                self.gamepad_cache.store(now, v)
            }
        };

        let media_playing = match self.media_cache.fresh(now) {
            Some(v) => v,
            None => {
                let v = self.media.is_playing().await;
                self.media_cache.store(now, v)
            }
        };

        Signals {
            idle_seconds,
            media_playing,
            gamepad_active: gamepad.active,
        }
    }
}
