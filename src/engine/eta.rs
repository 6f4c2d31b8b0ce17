use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementProfile {
    pub speed_kmh: f64,
    pub delay_minutes: u32,
}

impl MovementProfile {
    fn meters_per_minute(&self) -> f64 {
        self.speed_kmh * 1_000.0 / 60.0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Eta {
    pub arrival: DateTime<Utc>,
    pub minutes: i64,
}

/// Distance to arrival-time conversion, keyed by movement profile name.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    profiles: HashMap<String, MovementProfile>,
}

impl EtaEstimator {
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_profile("priority", 60.0, 0)
            .with_profile("regular", 40.0, 0)
            .with_profile("polling", 30.0, 5)
    }

    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Adds or replaces a profile. Non-positive speeds are ignored.
    pub fn with_profile(mut self, key: &str, speed_kmh: f64, delay_minutes: u32) -> Self {
        if speed_kmh.is_finite() && speed_kmh > 0.0 {
            self.profiles.insert(
                normalize_key(key),
                MovementProfile {
                    speed_kmh,
                    delay_minutes,
                },
            );
        }
        self
    }

    pub fn profile(&self, key: &str) -> Result<MovementProfile, TelemetryError> {
        self.profiles
            .get(&normalize_key(key))
            .copied()
            .ok_or_else(|| TelemetryError::UnknownProfile(key.to_string()))
    }

    pub fn eta(&self, distance_m: f64, profile_key: &str) -> Result<Eta, TelemetryError> {
        self.eta_at(distance_m, profile_key, Utc::now())
    }

    pub fn eta_at(
        &self,
        distance_m: f64,
        profile_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Eta, TelemetryError> {
        let profile = self.profile(profile_key)?;

        if !distance_m.is_finite() || distance_m < 0.0 {
            return Err(TelemetryError::BadRequest(format!(
                "distance must be a finite, non-negative number of meters, got {distance_m}"
            )));
        }

        let out_of_range = || {
            TelemetryError::BadRequest(format!(
                "distance {distance_m} m gives an arrival time outside the representable range"
            ))
        };

        let travel_minutes = (distance_m / profile.meters_per_minute()).ceil();
        if travel_minutes >= i64::MAX as f64 {
            return Err(out_of_range());
        }
        let minutes = (travel_minutes as i64)
            .checked_add(i64::from(profile.delay_minutes))
            .ok_or_else(out_of_range)?;
        let arrival = TimeDelta::try_minutes(minutes)
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or_else(out_of_range)?;

        Ok(Eta { arrival, minutes })
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
