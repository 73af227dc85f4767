use async_trait::async_trait;
use tracing::warn;

use crate::daemon::helpers::HelperHandle;

use super::IdleProbe;

/// Idle time from a helper that prints whole seconds since the last input.
pub struct HelperIdleProbe {
    helper: HelperHandle,
}

impl HelperIdleProbe {
    pub fn new(helper: HelperHandle) -> Self {
        Self { helper }
    }
}

/// `None` for anything that isn't a non-negative integer.
pub fn parse_idle_seconds(line: &str) -> Option<u64> {
    line.trim().parse::<u64>().ok()
}

#[async_trait]
impl IdleProbe for HelperIdleProbe {
    async fn idle_seconds(&self) -> u64 {
        let Some(line) = self.helper.query().await else {
            return 0;
        };
        parse_idle_seconds(&line).unwrap_or_else(|| {
            warn!("Helper {} answered with malformed idle time {line:?}", self.helper.name());
            0
        })
    }
}
