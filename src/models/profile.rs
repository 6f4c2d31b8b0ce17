use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppVisibility {
    Active,
    Background,
    Hidden,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SamplingMode {
    Active,
    Background,
    BatterySaver,
}

impl std::fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingMode::Active => write!(f, "active"),
            SamplingMode::Background => write!(f, "background"),
            SamplingMode::BatterySaver => write!(f, "battery_saver"),
        }
    }
}

/// Acquisition parameters handed to the position source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SamplingProfile {
    pub mode: SamplingMode,
    pub enable_high_accuracy: bool,
    pub max_sample_age_ms: u64,
    pub timeout_ms: u64,
}

impl SamplingProfile {
    pub const fn active() -> Self {
        Self {
            mode: SamplingMode::Active,
            enable_high_accuracy: true,
            max_sample_age_ms: 5_000,
            timeout_ms: 10_000,
        }
    }

    pub const fn background() -> Self {
        Self {
            mode: SamplingMode::Background,
            enable_high_accuracy: false,
            max_sample_age_ms: 30_000,
            timeout_ms: 20_000,
        }
    }

    pub const fn battery_saver() -> Self {
        Self {
            mode: SamplingMode::BatterySaver,
            enable_high_accuracy: false,
            max_sample_age_ms: 60_000,
            timeout_ms: 30_000,
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode == SamplingMode::Active
    }
}
