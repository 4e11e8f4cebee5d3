use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Floor applied to the measured duration so `fps` never divides by zero.
const MIN_DURATION_S: f64 = 1e-9;

/// Per-run timing accumulator. One per run, never reused.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    frame_count: u64,
    processing_times_ms: Vec<f64>,
    started_at: Instant,
}

/// Throughput and latency derived from a `RunMetrics` at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub frame_count: u64,
    pub duration_s: f64,
    pub fps: f64,
    pub avg_processing_ms: f64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started_at: Instant) -> Self {
        Self {
            frame_count: 0,
            processing_times_ms: Vec::new(),
            started_at,
        }
    }

    /// Records the processing time of one frame.
    pub fn record_frame(&mut self, elapsed_ms: f64) {
        self.frame_count += 1;
        self.processing_times_ms.push(elapsed_ms);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn summary(&self) -> MetricsSummary {
        self.summary_at(Instant::now())
    }

    /// Summary as of `now`. Pure function of the accumulated state.
    pub fn summary_at(&self, now: Instant) -> MetricsSummary {
        let duration_s = now
            .saturating_duration_since(self.started_at)
            .as_secs_f64()
            .max(MIN_DURATION_S);
        let avg_processing_ms = if self.processing_times_ms.is_empty() {
            0.0
        } else {
            self.processing_times_ms.iter().sum::<f64>() / self.processing_times_ms.len() as f64
        };
        MetricsSummary {
            frame_count: self.frame_count,
            duration_s,
            fps: self.frame_count as f64 / duration_s,
            avg_processing_ms,
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn summary_averages_recorded_frames() {
        let mut metrics = RunMetrics::new();
        metrics.record_frame(10.0);
        metrics.record_frame(20.0);
        metrics.record_frame(30.0);

        let summary = metrics.summary();
        assert_eq!(summary.frame_count, 3);
        assert!((summary.avg_processing_ms - 20.0).abs() < 1e-9);
        assert!((summary.fps * summary.duration_s - 3.0).abs() < 1e-6);
    }

    #[test]
    fn fps_uses_the_measured_span() {
        let start = Instant::now();
        let mut metrics = RunMetrics::started_at(start);
        for _ in 0..4 {
            metrics.record_frame(5.0);
        }
        let summary = metrics.summary_at(start + Duration::from_secs(2));
        assert!((summary.duration_s - 2.0).abs() < 1e-9);
        assert!((summary.fps - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_run_has_zero_latency_and_positive_duration() {
        let start = Instant::now();
        let metrics = RunMetrics::started_at(start);
        let summary = metrics.summary_at(start);
        assert_eq!(summary.frame_count, 0);
        assert_eq!(summary.avg_processing_ms, 0.0);
        assert!(summary.duration_s > 0.0);
        assert_eq!(summary.fps, 0.0);
    }
}
