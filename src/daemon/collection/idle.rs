use crate::daemon::probes::Signals;

/// Decides whether a tick counts as idle. Playing media or an active gamepad always mean the
/// user is present, whatever the input idle time says.
pub struct IdleEvaluator {
    threshold_s: u64,
}

impl IdleEvaluator {
    pub fn from_seconds(threshold_s: u64) -> Self {
        Self { threshold_s }
    }

    pub fn is_idle(&self, signals: &Signals) -> bool {
        self.threshold_s < signals.idle_seconds && !signals.media_playing && !signals.gamepad_active
    }
}

#[cfg(test)]
mod tests {
    use crate::daemon::probes::Signals;

    use super::IdleEvaluator;

    fn signals(idle_seconds: u64, media_playing: bool, gamepad_active: bool) -> Signals {
        Signals {
            idle_seconds,
            media_playing,
            gamepad_active,
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        let evaluator = IdleEvaluator::from_seconds(120);
        assert!(!evaluator.is_idle(&signals(120, false, false)));
        assert!(evaluator.is_idle(&signals(121, false, false)));
    }

    #[test]
    fn media_and_gamepad_suppress_idle() {
        let evaluator = IdleEvaluator::from_seconds(120);
        assert!(!evaluator.is_idle(&signals(300, true, false)));
        assert!(!evaluator.is_idle(&signals(300, false, true)));
        assert!(evaluator.is_idle(&signals(300, false, false)));
    }
}
