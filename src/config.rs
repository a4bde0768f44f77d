//! Per-engine replay settings.
use crate::error::{ReplayError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayConfig {
    /// Divides captured gaps: 2.0 replays twice as fast, 0.5 at half speed.
    pub speed_factor: f64,
    /// Re-resolve the source pattern and start over once every source is exhausted.
    pub looping: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { speed_factor: 1.0, looping: false }
    }
}

impl ReplayConfig {
    #[must_use]
    pub fn with_speed_factor(mut self, speed_factor: f64) -> Self {
        self.speed_factor = speed_factor;
        self
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.speed_factor.is_finite() || self.speed_factor <= 0.0 {
            return Err(ReplayError::InvalidSpeed(self.speed_factor));
        }
        Ok(())
    }
}
