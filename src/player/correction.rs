// ABOUTME: C4 - turns the filtered sync error into a drop-every-N / insert-every-N plan
// ABOUTME: owned entirely by the control thread; re-anchor is signalled out via a bool return

use super::filter::SyncErrorFilter;
use std::time::{Duration, Instant};

/// Corrections are suppressed inside this band around zero error.
pub const DEADBAND_US: f64 = 2_000.0;

/// Divergence beyond this magnitude triggers a re-anchor instead of a
/// continuous correction.
pub const REANCHOR_THRESHOLD_US: f64 = 500_000.0;

/// Minimum spacing between re-anchors.
pub const REANCHOR_COOLDOWN: Duration = Duration::from_secs(5);

/// Corrections aim to absorb the whole measured error over this horizon
/// the whole measured error over this horizon.
pub const CORRECTION_TARGET_SEC: f64 = 2.0;

/// Correction rate never exceeds this fraction of the sample rate (±4%).
pub const MAX_SPEED_CORRECTION: f64 = 0.04;

/// The active correction plan: at most one of the two counts is ever
/// nonzero. A count of 0 means "no correction of that kind".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionPlan {
    pub insert_every_n_frames: u64,
    pub drop_every_n_frames: u64,
}

impl CorrectionPlan {
    pub const NONE: Self = Self {
        insert_every_n_frames: 0,
        drop_every_n_frames: 0,
    };
}

/// Converts the smoothed sync error into a [`CorrectionPlan`], and decides
/// when the error is large enough to demand a re-anchor instead.
pub struct CorrectionScheduler {
    filter: SyncErrorFilter,
    last_reanchor: Option<Instant>,
}

impl CorrectionScheduler {
    pub fn new() -> Self {
        Self {
            filter: SyncErrorFilter::new(),
            last_reanchor: None,
        }
    }

    pub fn filter(&self) -> &SyncErrorFilter {
        &self.filter
    }

    /// Feed an instantaneous measurement and compute the next correction
    /// plan. Returns `Some(plan)` for a continuous correction, or
    /// `None` when the error demands a re-anchor instead (the caller must
    /// invoke `clear` and reset scheduling).
    ///
    /// `now` is the control-thread's current instant, for cooldown tracking.
    pub fn decide(
        &mut self,
        measurement_us: f64,
        sample_rate: u32,
        now: Instant,
    ) -> Option<CorrectionPlan> {
        self.filter.update(measurement_us);
        let e = self.filter.offset();

        if e.abs() <= DEADBAND_US {
            return Some(CorrectionPlan::NONE);
        }

        if e.abs() > REANCHOR_THRESHOLD_US {
            let cooldown_elapsed = match self.last_reanchor {
                Some(last) => now.duration_since(last) >= REANCHOR_COOLDOWN,
                None => true,
            };
            if cooldown_elapsed {
                self.last_reanchor = Some(now);
                return None;
            }
            // Cooldown not yet elapsed: suppress the re-anchor and fall
            // through to a continuous correction at max rate instead of
            // doing nothing. The cooldown is intentionally stamped before
            // the re-anchor actually completes.
        }

        let desired_rate = (e.abs() * sample_rate as f64 / 1_000_000.0) / CORRECTION_TARGET_SEC;
        let max_rate = sample_rate as f64 * MAX_SPEED_CORRECTION;
        let corrections_per_sec = desired_rate.min(max_rate).max(f64::MIN_POSITIVE);
        let interval_frames = ((sample_rate as f64 / corrections_per_sec).round() as u64).max(1);

        if e > 0.0 {
            Some(CorrectionPlan {
                insert_every_n_frames: 0,
                drop_every_n_frames: interval_frames,
            })
        } else {
            Some(CorrectionPlan {
                insert_every_n_frames: interval_frames,
                drop_every_n_frames: 0,
            })
        }
    }

    /// Reset on `clear`: fresh filter, cooldown state preserved so a
    /// re-anchor that just happened still blocks a second one for the rest
    /// of the cooldown window.
    pub fn reset_filter(&mut self) {
        self.filter.reset();
    }
}

impl Default for CorrectionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44_100;

    #[test]
    fn within_deadband_zeroes_both_counters() {
        let mut s = CorrectionScheduler::new();
        let plan = s.decide(500.0, RATE, Instant::now()).unwrap();
        assert_eq!(plan, CorrectionPlan::NONE);
    }

    #[test]
    fn positive_error_selects_drop() {
        let mut s = CorrectionScheduler::new();
        let plan = s.decide(10_000.0, RATE, Instant::now()).unwrap();
        assert!(plan.drop_every_n_frames > 0);
        assert_eq!(plan.insert_every_n_frames, 0);
    }

    #[test]
    fn negative_error_selects_insert() {
        let mut s = CorrectionScheduler::new();
        let plan = s.decide(-10_000.0, RATE, Instant::now()).unwrap();
        assert!(plan.insert_every_n_frames > 0);
        assert_eq!(plan.drop_every_n_frames, 0);
    }

    #[test]
    fn catastrophic_error_triggers_reanchor() {
        let mut s = CorrectionScheduler::new();
        let plan = s.decide(600_000.0, RATE, Instant::now());
        assert!(plan.is_none());
    }

    #[test]
    fn reanchor_suppressed_during_cooldown() {
        let mut s = CorrectionScheduler::new();
        let t0 = Instant::now();
        assert!(s.decide(600_000.0, RATE, t0).is_none());
        // Within cooldown: a second catastrophic error must not re-anchor.
        let plan = s.decide(600_000.0, RATE, t0 + Duration::from_secs(1));
        assert!(plan.is_some());
    }

    #[test]
    fn rate_is_capped_at_max_speed_correction() {
        let mut s = CorrectionScheduler::new();
        // Huge error but within cooldown window after an initial re-anchor,
        // forcing the capped continuous path.
        let t0 = Instant::now();
        s.decide(600_000.0, RATE, t0);
        let plan = s
            .decide(600_000.0, RATE, t0 + Duration::from_millis(100))
            .unwrap();
        let max_rate = RATE as f64 * MAX_SPEED_CORRECTION;
        let min_interval = (RATE as f64 / max_rate).round() as u64;
        assert_eq!(plan.drop_every_n_frames, min_interval);
    }
}
