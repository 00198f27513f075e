use std::time::Duration;

use super::profile::{PowerMode, RuntimeProfile, Visibility};

/// Decides how often a key is polled under a runtime profile.
pub trait IntervalProvider: Send + Sync {
    /// `None` suspends polling.
    fn interval(&self, profile: &RuntimeProfile) -> Option<Duration>;
}

/// Foreground interval, stretched in low-power mode, with an optional
/// background interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdaptiveInterval {
    pub foreground: Duration,
    pub low_power_multiplier: u32,
    /// Used only when the profile allows background refresh.
    pub background: Option<Duration>,
}

impl AdaptiveInterval {
    pub fn new(foreground: Duration) -> Self {
        Self {
            foreground,
            low_power_multiplier: 1,
            background: None,
        }
    }

    pub fn with_low_power_multiplier(mut self, multiplier: u32) -> Self {
        self.low_power_multiplier = multiplier.max(1);
        self
    }

    pub fn with_background(mut self, interval: Option<Duration>) -> Self {
        self.background = interval;
        self
    }
}

impl IntervalProvider for AdaptiveInterval {
    fn interval(&self, profile: &RuntimeProfile) -> Option<Duration> {
        let base = match profile.visibility {
            Visibility::Foreground => self.foreground,
            Visibility::Background if profile.background_refresh => self.background?,
            Visibility::Background => return None,
        };
        let scaled = match profile.power {
            PowerMode::Normal => base,
            PowerMode::LowPower => base.saturating_mul(self.low_power_multiplier.max(1)),
        };
        (!scaled.is_zero()).then_some(scaled)
    }
}
