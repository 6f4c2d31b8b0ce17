use std::sync::{PoisonError, RwLock};

use crate::platform::BatteryLevel;

/// Last battery level reported by the device, if any.
#[derive(Debug, Default)]
pub struct ReportedBattery {
    level: RwLock<Option<f64>>,
}

impl ReportedBattery {
    pub fn new(initial: Option<f64>) -> Self {
        Self {
            level: RwLock::new(initial.map(|f| f.clamp(0.0, 1.0))),
        }
    }

    pub fn report(&self, fraction: Option<f64>) {
        *self.level.write().unwrap_or_else(PoisonError::into_inner) =
            fraction.filter(|f| f.is_finite()).map(|f| f.clamp(0.0, 1.0));
    }
}

impl BatteryLevel for ReportedBattery {
    fn fraction(&self) -> Option<f64> {
        *self.level.read().unwrap_or_else(PoisonError::into_inner)
    }
}
