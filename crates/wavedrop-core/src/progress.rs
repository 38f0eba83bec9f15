//! Transfer progress accounting and human-readable formatting.

use std::time::{Duration, Instant};

/// A point-in-time view of a running transfer.
///
/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes transferred so far
    pub bytes_transferred: u64,
    /// Total bytes expected
    pub total_bytes: u64,
    /// Percentage in [0, 100], clamped to absorb chunk-size rounding
    pub percentage: f64,
    /// Instantaneous throughput in bytes per second
    pub speed_bps: f64,
    /// Estimated time remaining; `None` while throughput is zero
    pub eta: Option<Duration>,
}

/// Computes progress snapshots from wall-clock elapsed time.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    started_at: Instant,
}

impl ProgressTracker {
    /// Start tracking a transfer of `total_bytes`.
    #[must_use]
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            started_at: Instant::now(),
        }
    }

    /// Snapshot progress after `bytes_transferred` bytes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, bytes_transferred: u64) -> ProgressSnapshot {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let speed_bps = if elapsed > 0.0 {
            bytes_transferred as f64 / elapsed
        } else {
            0.0
        };

        let percentage = if self.total_bytes == 0 {
            100.0
        } else {
            ((bytes_transferred as f64 / self.total_bytes as f64) * 100.0).clamp(0.0, 100.0)
        };

        let remaining = self.total_bytes.saturating_sub(bytes_transferred) as f64;
        let eta = if speed_bps > 0.0 {
            Some(Duration::from_secs_f64(remaining / speed_bps))
        } else {
            None
        };

        ProgressSnapshot {
            bytes_transferred,
            total_bytes: self.total_bytes,
            percentage,
            speed_bps,
            eta,
        }
    }
}

/// Format a byte count as a human-readable string.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let exponent = ((bytes as f64).log2() / 10.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[exponent])
    }
}

/// Format a throughput as a human-readable string.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second <= 0.0 || !bytes_per_second.is_finite() {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_size(bytes_per_second as u64))
}

/// Format an estimated time remaining as a human-readable string.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "...".to_string();
    };

    let seconds = eta.as_secs();
    if seconds < 60 {
        return format!("{seconds}s");
    }

    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes < 60 {
        return format!("{minutes}m {secs}s");
    }

    let hours = minutes / 60;
    let mins = minutes % 60;
    format!("{hours}h {mins}m")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_clamped() {
        let tracker = ProgressTracker::new(100);
        // Chunk-size rounding can report more bytes than the total.
        let snapshot = tracker.snapshot(132);
        assert!((snapshot.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_total_is_complete() {
        let tracker = ProgressTracker::new(0);
        let snapshot = tracker.snapshot(0);
        assert!((snapshot.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_undefined_while_stalled() {
        let tracker = ProgressTracker::new(1_000_000);
        let snapshot = tracker.snapshot(0);
        assert!(snapshot.eta.is_none());
    }

    #[test]
    fn percentage_is_monotonic() {
        let tracker = ProgressTracker::new(10_000);
        let mut last = -1.0;
        for transferred in (0..=10_000).step_by(1000) {
            let snapshot = tracker.snapshot(transferred);
            assert!(snapshot.percentage >= last);
            assert!((0.0..=100.0).contains(&snapshot.percentage));
            last = snapshot.percentage;
        }
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1_048_576), "1.00 MB");
        assert_eq!(format_size(10_737_418_240), "10.00 GB");
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(None), "...");
        assert_eq!(format_eta(Some(Duration::from_secs(42))), "42s");
        assert_eq!(format_eta(Some(Duration::from_secs(125))), "2m 5s");
        assert_eq!(format_eta(Some(Duration::from_secs(3720))), "1h 2m");
    }
}
