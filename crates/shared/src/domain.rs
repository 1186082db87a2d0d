use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(RunId);

impl RunId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Tolerance used when bucketing progress values. Progress is computed as
/// `ticks * step`, so 0.7 arrives as 0.7000000000000001.
const TIER_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    None,
    Light,
    Medium,
    Heavy,
}

impl FeedbackTier {
    /// Maps a progress value onto its feedback bucket.
    ///
    /// `< 0.1` is `None`, `0.1..=0.3` is `Light` and `0.4..=0.7` is `Medium`.
    /// Everything else, including the gap between 0.3 and 0.4, is `Heavy`.
    pub fn for_progress(value: f64) -> Self {
        if value < 0.1 - TIER_EPSILON {
            Self::None
        } else if value <= 0.3 + TIER_EPSILON {
            Self::Light
        } else if (0.4 - TIER_EPSILON..=0.7 + TIER_EPSILON).contains(&value) {
            Self::Medium
        } else {
            Self::Heavy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Light => "light",
            Self::Medium => "medium",
            Self::Heavy => "heavy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub value: f64,
    pub completed: bool,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            value: 0.0,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl SequencerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    Home,
    Connecting,
    Connected,
}

impl Screen {
    pub fn title(self) -> &'static str {
        match self {
            Self::Home => "CONNECT",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected Successfully!",
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
