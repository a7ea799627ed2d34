// Composite pass statistics
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Measurement over one report interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSummary {
    pub fps: f64,
    /// Windows skipped across the interval's passes
    pub skipped: usize,
}

/// Composite passes since activation, with a periodic rate summary
#[derive(Debug)]
pub struct FrameStats {
    passes: u64,
    interval_start: Instant,
    interval_passes: u32,
    interval_skipped: usize,
    last: Option<PassSummary>,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            passes: 0,
            interval_start: now,
            interval_passes: 0,
            interval_skipped: 0,
            last: None,
        }
    }

    /// Record a finished pass. Returns a summary once per report interval.
    pub fn record(&mut self, now: Instant, skipped: usize) -> Option<PassSummary> {
        self.passes += 1;
        self.interval_passes += 1;
        self.interval_skipped += skipped;

        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }
        let summary = PassSummary {
            fps: self.interval_passes as f64 / elapsed.as_secs_f64(),
            skipped: self.interval_skipped,
        };
        self.interval_start = now;
        self.interval_passes = 0;
        self.interval_skipped = 0;
        self.last = Some(summary);
        Some(summary)
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Rate of the last completed interval; 0 before the first report
    pub fn fps(&self) -> f64 {
        self.last.map(|s| s.fps).unwrap_or(0.0)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}
