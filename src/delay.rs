//! Reproduce the original gaps between captured requests.
use crate::record::PayloadType;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DelaySimulator {
    speed_factor: f64,
    /// Timestamp of the previously emitted record, `None` before the first
    /// record and right after a loop restart.
    last: Option<i64>,
}

impl DelaySimulator {
    /// `speed_factor` is expected to be validated (finite, > 0).
    pub fn new(speed_factor: f64) -> Self {
        Self { speed_factor, last: None }
    }

    /// Wait to apply before emitting a record of `kind` captured at
    /// `timestamp`. Only requests are delayed; every record moves the
    /// baseline.
    pub fn delay_for(&mut self, kind: PayloadType, timestamp: i64) -> Option<Duration> {
        let prev = self.last.replace(timestamp);
        if kind != PayloadType::Request {
            return None;
        }
        let delta = timestamp.saturating_sub(prev?);
        if delta <= 0 {
            return None;
        }
        let nanos = if self.speed_factor == 1.0 {
            delta as f64
        } else {
            delta as f64 / self.speed_factor
        };
        Some(Duration::from_nanos(nanos as u64)).filter(|d| !d.is_zero())
    }

    /// Forget the baseline so the next record is emitted without a wait.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
