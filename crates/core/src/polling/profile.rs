use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Foreground,
    Background,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    Normal,
    LowPower,
}

/// Host runtime signals that drive polling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProfile {
    pub visibility: Visibility,
    pub power: PowerMode,
    /// Whether the host allows refreshing while backgrounded.
    pub background_refresh: bool,
}

impl RuntimeProfile {
    pub fn foreground() -> Self {
        Self::default()
    }

    pub fn background() -> Self {
        Self {
            visibility: Visibility::Background,
            ..Self::default()
        }
    }

    pub fn with_power(mut self, power: PowerMode) -> Self {
        self.power = power;
        self
    }

    pub fn with_background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh = enabled;
        self
    }

    pub fn allows_refresh(&self) -> bool {
        self.visibility == Visibility::Foreground || self.background_refresh
    }
}
