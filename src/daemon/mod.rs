use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use collection::{
    arbiter::SessionArbiter,
    collector::ActivityTracker,
    feed::{BrowserFeed, FeedListener},
};
use config::{HelperSpec, TrackerConfig};
use futures::future::join_all;
use helpers::{start_supervised, supervisor::HelperSupervisor, HelperHandle};
use probes::{
    gamepad::HelperGamepadProbe, idle::HelperIdleProbe, media::CommandMediaProbe, GamepadProbe,
    IdleProbe, MediaProbe, NoSignal, SignalSampler,
};
use storage::session_storage::{SessionStorageImpl, SessionStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowObserver, WindowObserver},
};

pub mod args;
pub mod collection;
pub mod config;
pub mod helpers;
pub mod probes;
pub mod shutdown;
pub mod storage;

pub const SESSIONS_DIR: &str = "sessions";

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    let dir = std::path::absolute(dir)?;
    let config = TrackerConfig::load(&dir)?;
    let storage = SessionStorageImpl::new(dir.join(SESSIONS_DIR))?;
    let observer = GenericWindowObserver::new()?;

    std::env::set_current_dir("/")?;

    let shutdown_token = CancellationToken::new();

    let (sampler, supervisors) = create_sampler(&config, &shutdown_token);

    let feed = BrowserFeed::new();
    let listener = FeedListener::bind(
        config.feed_address.as_str(),
        feed.clone(),
        Arc::new(DefaultClock),
        shutdown_token.clone(),
    )
    .await
    .inspect_err(|e| error!("Browser reports are disabled {e:?}"))
    .ok();

    let tracker = create_tracker(
        &config,
        storage,
        sampler,
        observer,
        &feed,
        &shutdown_token,
        DefaultClock,
    );

    let (_, tracking_result, helper_results, feed_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        tracker.run(),
        join_all(supervisors.into_iter().map(HelperSupervisor::run)),
        async {
            match listener {
                Some(listener) => listener.run().await,
                None => Ok(()),
            }
        },
    );

    if let Err(tracking_result) = tracking_result {
        error!("Tracking module got an error {:?}", tracking_result);
    }

    for helper_result in helper_results.into_iter().filter_map(Result::err) {
        error!("Helper supervisor got an error {:?}", helper_result);
    }

    if let Err(feed_result) = feed_result {
        error!("Browser feed got an error {:?}", feed_result);
    }

    Ok(())
}

/// Builds the probes from config. Helper-backed probes get a supervisor each, which the caller
/// has to run. Unconfigured probes never report a signal.
fn create_sampler(
    config: &TrackerConfig,
    shutdown_token: &CancellationToken,
) -> (SignalSampler, Vec<HelperSupervisor>) {
    let mut supervisors = vec![];
    let mut supervise = |name: &str, spec: &Option<HelperSpec>| -> Option<HelperHandle> {
        let Some(spec) = spec.clone() else {
            info!("No {name} helper configured");
            return None;
        };
        let (handle, supervisor) = start_supervised(
            name,
            spec,
            config.helper_restart_delay(),
            shutdown_token.clone(),
        );
        supervisors.push(supervisor);
        Some(handle)
    };

    let idle: Box<dyn IdleProbe> = match supervise("idle", &config.idle_helper) {
        Some(handle) => Box::new(HelperIdleProbe::new(handle)),
        None => Box::new(NoSignal),
    };
    let gamepad: Box<dyn GamepadProbe> = match supervise("gamepad", &config.gamepad_helper) {
        Some(handle) => Box::new(HelperGamepadProbe::new(handle)),
        None => Box::new(NoSignal),
    };
    let media: Box<dyn MediaProbe> = match &config.media_command {
        Some(spec) => Box::new(CommandMediaProbe::new(spec.clone(), config.media_timeout())),
        None => {
            info!("No media command configured");
            Box::new(NoSignal)
        }
    };

    let sampler = SignalSampler::new(
        idle,
        gamepad,
        media,
        config.gamepad_interval(),
        config.media_interval(),
    );
    (sampler, supervisors)
}

fn create_tracker<S: SessionStore>(
    config: &TrackerConfig,
    storage: S,
    sampler: SignalSampler,
    observer: impl WindowObserver + 'static,
    feed: &BrowserFeed,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> ActivityTracker<S> {
    ActivityTracker::new(
        config,
        SessionArbiter::new(storage, config.debounce()),
        sampler,
        Box::new(observer),
        feed.reader(),
        Box::new(clock),
        shutdown_token.clone(),
    )
}
