//! Tick timing instrumentation.
//!
//! Tracks per-tick processing durations in a rolling window and reports
//! percentiles plus the effective tick rate, both on demand over IPC and
//! as a once-a-second `performance` broadcast.

/// Rolling tick timing statistics.
#[derive(Debug)]
pub struct TickTiming {
    /// Per-tick processing time in milliseconds.
    samples: Vec<f64>,
    /// Maximum number of samples to keep.
    window_size: usize,
    /// Total ticks recorded.
    pub total_ticks: u64,
    /// Ticks that exceeded the budget.
    pub over_budget: u64,
    /// Per-tick budget in milliseconds (16.7 at 60 Hz).
    pub budget_ms: f64,
    /// Milliseconds accumulated since the last performance report.
    since_report_ms: f64,
}

impl Default for TickTiming {
    fn default() -> Self {
        Self::new(600, 16.7)
    }
}

impl TickTiming {
    pub fn new(window_size: usize, budget_ms: f64) -> Self {
        Self {
            samples: Vec::with_capacity(window_size),
            window_size,
            total_ticks: 0,
            over_budget: 0,
            budget_ms,
            since_report_ms: 0.0,
        }
    }

    /// Record one tick: how long its processing took, and how much wall
    /// time it covered.
    pub fn record(&mut self, work_ms: f64, dt_ms: f64) {
        self.samples.push(work_ms);
        if self.samples.len() > self.window_size {
            self.samples.remove(0);
        }
        self.total_ticks += 1;
        if work_ms > self.budget_ms {
            self.over_budget += 1;
        }
        self.since_report_ms += dt_ms;
    }

    /// Compute percentile from a sorted slice.
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn sorted_samples(&self) -> Vec<f64> {
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }

    /// Generate s-expression with full timing statistics for IPC.
    pub fn stats_sexp(&self) -> String {
        let sorted = self.sorted_samples();
        let p50 = Self::percentile(&sorted, 50.0);
        let over_pct = if self.total_ticks > 0 {
            (self.over_budget as f64 / self.total_ticks as f64) * 100.0
        } else {
            0.0
        };
        format!(
            "(:tick-p50 {:.2} :tick-p95 {:.2} :tick-p99 {:.2} :budget-ms {:.1} :over-budget-pct {:.1} :total-ticks {})",
            p50,
            Self::percentile(&sorted, 95.0),
            Self::percentile(&sorted, 99.0),
            self.budget_ms,
            over_pct,
            self.total_ticks,
        )
    }

    /// Once at least a second of wall time has accumulated, produce a
    /// `performance` event and restart the reporting interval.
    pub fn take_performance_event(&mut self) -> Option<String> {
        if self.since_report_ms < 1000.0 {
            return None;
        }
        self.since_report_ms = 0.0;
        let sorted = self.sorted_samples();
        let p50 = Self::percentile(&sorted, 50.0);
        Some(format!(
            "(:type :event :event :performance :latency-ms {:.1} :tick-p99 {:.1} :ticks {})",
            p50,
            Self::percentile(&sorted, 99.0),
            self.total_ticks,
        ))
    }
}

// ── Tests ───────────────────────────────────────────────────
