use async_trait::async_trait;
use tracing::warn;

use crate::daemon::helpers::HelperHandle;

use super::{GamepadProbe, GamepadState};

/// Gamepad activity from a helper printing `connected,active`, e.g. `true,false`.
pub struct HelperGamepadProbe {
    helper: HelperHandle,
}

impl HelperGamepadProbe {
    pub fn new(helper: HelperHandle) -> Self {
        Self { helper }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

pub fn parse_gamepad_state(line: &str) -> Option<GamepadState> {
    let (connected, active) = line.trim().split_once(',')?;
    Some(GamepadState {
        connected: parse_flag(connected)?,
        active: parse_flag(active)?,
    })
}

#[async_trait]
impl GamepadProbe for HelperGamepadProbe {
    async fn gamepad_state(&self) -> GamepadState {
        let Some(line) = self.helper.query().await else {
            return GamepadState::default();
        };
        parse_gamepad_state(&line).unwrap_or_else(|| {
            warn!("Helper {} answered with malformed gamepad state {line:?}", self.helper.name());
            GamepadState::default()
        })
    }
}
