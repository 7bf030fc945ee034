use std::time::Duration;

use crate::error::PlotConfigError;

/// Settings shared by every plot variant
///
/// `update_period` is accepted as raw seconds the way interactive callers
/// supply it and is validated, together with the bucket capacity, before
/// any plot state is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlotSettings {
    update_period: f64,
    capacity: usize,
    poll_interval: Duration,
}

impl PlotSettings {
    /// Changes the minimum time between snapshot emissions, in seconds
    pub fn with_update_period(self, update_period: f64) -> Self {
        Self {
            update_period,
            ..self
        }
    }

    /// Changes the number of buckets kept per series
    ///
    /// Coarsening merges bucket pairs, so the capacity must be even and
    /// at least 2.
    pub fn with_capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Changes how often the background emitter polls for new data
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Minimum interval between emissions
    ///
    /// Only meaningful once [`PlotSettings::validate`] accepted the
    /// settings, conversion panics on a negative or NaN period.
    pub fn update_period(&self) -> Duration {
        Duration::from_secs_f64(self.update_period)
    }

    /// Rejects settings no plot can be built from
    pub fn validate(&self) -> Result<(), PlotConfigError> {
        if !self.update_period.is_finite() || self.update_period < 0.0 {
            return Err(PlotConfigError::InvalidUpdatePeriod(self.update_period));
        }

        if self.capacity < 2 {
            return Err(PlotConfigError::CapacityTooSmall(self.capacity));
        }

        if self.capacity % 2 != 0 {
            return Err(PlotConfigError::OddCapacity(self.capacity));
        }

        Ok(())
    }
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            update_period: 0.1,
            capacity: 100,
            poll_interval: Duration::from_millis(50),
        }
    }
}
