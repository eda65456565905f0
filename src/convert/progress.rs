//! Progress telemetry from the transcoder's structured output.

use std::path::PathBuf;
use std::time::Instant;

/// One UI-facing progress sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Completion percentage, clamped to [0, 100] and never decreasing.
    pub percent: f64,
    /// Estimated seconds remaining; `None` until a rate can be computed.
    pub eta_secs: Option<f64>,
    /// Instantaneous output throughput in KB/s, from output-file growth.
    pub throughput_kbps: f64,
}

impl ProgressUpdate {
    /// Human-readable status line for the UI.
    pub fn status_line(&self) -> String {
        match self.eta_secs {
            Some(eta) => format!(
                "{:5.1}% | ETA {:5.1}s | {:.0} KB/s",
                self.percent, eta, self.throughput_kbps
            ),
            None => format!(
                "{:5.1}% | ETA    -- | {:.0} KB/s",
                self.percent, self.throughput_kbps
            ),
        }
    }
}

/// Converts `-progress pipe:1` lines into [`ProgressUpdate`]s.
pub struct ProgressTracker {
    total_duration_secs: f64,
    output: PathBuf,
    started: Instant,
    last_percent: f64,
    last_output_size: Option<(u64, Instant)>,
}

impl ProgressTracker {
    pub fn new(total_duration_secs: f64, output: PathBuf) -> Self {
        Self {
            total_duration_secs,
            output,
            started: Instant::now(),
            last_percent: 0.0,
            last_output_size: None,
        }
    }

    /// Feed one line of transcoder output; returns an update for elapsed-time
    /// reports and `None` for every other key.
    pub fn observe(&mut self, line: &str) -> Option<ProgressUpdate> {
        // out_time_ms is microseconds despite the name.
        let value = line.strip_prefix("out_time_ms=")?.trim();
        let micros: u64 = value.parse().ok()?;
        let out_time = micros as f64 / 1_000_000.0;

        let mut percent = if self.total_duration_secs > 0.0 {
            (out_time / self.total_duration_secs) * 100.0
        } else {
            0.0
        };
        percent = percent.clamp(0.0, 100.0).max(self.last_percent);
        self.last_percent = percent;

        let elapsed = self.started.elapsed().as_secs_f64().max(0.001);
        let rate = if out_time > 0.0 { out_time / elapsed } else { 0.0 };
        let eta_secs = if rate > 0.0 {
            Some(((self.total_duration_secs - out_time) / rate).max(0.0))
        } else {
            None
        };

        Some(ProgressUpdate {
            percent,
            eta_secs,
            throughput_kbps: self.output_kbps(),
        })
    }

    /// Output-file byte growth since the previous sample, over wall clock.
    fn output_kbps(&mut self) -> f64 {
        let Ok(metadata) = std::fs::metadata(&self.output) else {
            return 0.0;
        };
        let bytes = metadata.len();
        let now = Instant::now();

        match self.last_output_size.replace((bytes, now)) {
            None => 0.0,
            Some((prev_bytes, prev_at)) => {
                let dt = now.duration_since(prev_at).as_secs_f64().max(0.001);
                let grown = bytes.saturating_sub(prev_bytes) as f64;
                grown / dt / 1024.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(duration: f64) -> ProgressTracker {
        ProgressTracker::new(duration, PathBuf::from("/nonexistent/out.mp4"))
    }

    #[test]
    fn reports_percentage_from_elapsed_output_time() {
        let mut tracker = tracker(120.0);
        let update = tracker.observe("out_time_ms=60000000").unwrap();
        assert!((update.percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ignores_other_progress_keys() {
        let mut tracker = tracker(120.0);
        assert_eq!(tracker.observe("frame=42"), None);
        assert_eq!(tracker.observe("speed=1.5x"), None);
        assert_eq!(tracker.observe("progress=continue"), None);
        assert_eq!(tracker.observe("out_time_ms=N/A"), None);
    }

    #[test]
    fn percent_is_clamped_and_monotone() {
        let mut tracker = tracker(10.0);

        // Past the end of the reported duration: clamp at 100.
        let update = tracker.observe("out_time_ms=15000000").unwrap();
        assert_eq!(update.percent, 100.0);

        // A later, smaller report never moves the percentage backwards.
        let update = tracker.observe("out_time_ms=5000000").unwrap();
        assert_eq!(update.percent, 100.0);
    }

    #[test]
    fn eta_is_indeterminate_at_zero_output_time() {
        let mut tracker = tracker(120.0);
        let update = tracker.observe("out_time_ms=0").unwrap();
        assert_eq!(update.eta_secs, None);
    }

    #[test]
    fn eta_is_positive_mid_job() {
        let mut tracker = tracker(120.0);
        let update = tracker.observe("out_time_ms=60000000").unwrap();
        let eta = update.eta_secs.unwrap();
        assert!(eta >= 0.0);
    }

    #[test]
    fn throughput_is_zero_without_output_file() {
        let mut tracker = tracker(120.0);
        let update = tracker.observe("out_time_ms=1000000").unwrap();
        assert_eq!(update.throughput_kbps, 0.0);
    }

    #[test]
    fn throughput_tracks_output_growth() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, vec![0u8; 1024]).unwrap();

        let mut tracker = ProgressTracker::new(120.0, out.clone());
        // First sample only establishes the baseline.
        let update = tracker.observe("out_time_ms=1000000").unwrap();
        assert_eq!(update.throughput_kbps, 0.0);

        std::fs::write(&out, vec![0u8; 1024 * 512]).unwrap();
        let update = tracker.observe("out_time_ms=2000000").unwrap();
        assert!(update.throughput_kbps > 0.0);
    }
}
