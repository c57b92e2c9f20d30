//! Report suppression: distance threshold plus periodic fallback

use super::geo::PresenceSample;
use std::time::Duration;
use tokio::time::Instant;

/// Decides whether a sample is worth reporting.
///
/// Only the last *reported* sample is kept. A sample is reported when it is
/// at least `threshold_m` from that sample, or when `interval` has passed
/// since that report. The first sample is always reported.
#[derive(Debug, Clone)]
pub struct PresenceThrottle {
    threshold_m: f64,
    interval: Duration,
    last: Option<(PresenceSample, Instant)>,
}

impl PresenceThrottle {
    pub fn new(threshold_m: f64, interval: Duration) -> Self {
        Self {
            threshold_m,
            interval,
            last: None,
        }
    }

    pub fn should_report(&self, sample: &PresenceSample, now: Instant) -> bool {
        match &self.last {
            None => true,
            Some((last, reported_at)) => {
                last.distance_to(sample) >= self.threshold_m
                    || now.saturating_duration_since(*reported_at) >= self.interval
            }
        }
    }

    pub fn mark_reported(&mut self, sample: PresenceSample, now: Instant) {
        self.last = Some((sample, now));
    }

    pub fn last_reported(&self) -> Option<&PresenceSample> {
        self.last.as_ref().map(|(sample, _)| sample)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
