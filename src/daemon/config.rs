use std::{io::ErrorKind, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Long-lived helper answering one line per request token it receives on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_request_token")]
    pub request_token: String,
}

fn default_request_token() -> String {
    "check".into()
}

/// Program started once per query; its first stdout line is the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Tunables of the tracker, read from `<application dir>/config.json`. Every field is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub tick_interval_ms: u64,
    pub idle_threshold_secs: u64,
    pub debounce_ms: u64,
    pub gamepad_interval_ms: u64,
    pub media_interval_ms: u64,
    pub media_timeout_ms: u64,
    pub helper_restart_delay_ms: u64,
    pub idle_helper: Option<HelperSpec>,
    pub gamepad_helper: Option<HelperSpec>,
    pub media_command: Option<CommandSpec>,
    pub feed_address: String,
    /// Browser reports older than this are not used to fill in urls. Unset means a report
    /// stays valid until the next one arrives.
    pub browser_feed_max_age_secs: Option<u64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            idle_threshold_secs: 120,
            debounce_ms: 900,
            gamepad_interval_ms: 1000,
            media_interval_ms: 5000,
            media_timeout_ms: 3000,
            helper_restart_delay_ms: 5000,
            idle_helper: None,
            gamepad_helper: None,
            media_command: None,
            feed_address: "127.0.0.1:3001".into(),
            browser_feed_max_age_secs: None,
        }
    }
}

impl TrackerConfig {
    /// Reads the config from the application directory, falling back to defaults when the
    /// file doesn't exist.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {path:?}")),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read config {path:?}")),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.debounce_ms as i64)
    }

    pub fn gamepad_interval(&self) -> Duration {
        Duration::from_millis(self.gamepad_interval_ms)
    }

    pub fn media_interval(&self) -> Duration {
        Duration::from_millis(self.media_interval_ms)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_millis(self.media_timeout_ms)
    }

    pub fn helper_restart_delay(&self) -> Duration {
        Duration::from_millis(self.helper_restart_delay_ms)
    }

    pub fn browser_feed_max_age(&self) -> Option<chrono::Duration> {
        self.browser_feed_max_age_secs
            .map(|v| chrono::Duration::seconds(v as i64))
    }
}
