//! Timing helpers for pipeline stages.

use std::time::Instant;

/// Records the elapsed time of a stage into
/// `scraper_stage_duration_seconds{stage=...}` when dropped, so a stage that
/// bails out early with `?` is still measured.
pub struct TimingGuard {
    start: Instant,
    stage: &'static str,
}

impl TimingGuard {
    pub fn new(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Ends the measurement now instead of at scope exit.
    pub fn finish(self) {}
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(super::STAGE_DURATION, "stage" => self.stage).record(duration);
    }
}

/// Convenience function to create a timing guard
///
/// Usage:
/// ```rust
/// let _timing = stats_scraper::metrics::time_stage("render");
/// // ... do work ...
/// ```
pub fn time_stage(stage: &'static str) -> TimingGuard {
    TimingGuard::new(stage)
}
