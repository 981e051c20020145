//! Progress arithmetic shared by the engine and its callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cumulative row counters of a job.
///
/// `processed_rows == successful_rows + failed_row_count` for every value the
/// engine hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub failed_row_count: u64,
}

impl JobCounters {
    #[must_use]
    pub fn percent_complete(&self) -> Option<u8> {
        percent_complete(self.processed_rows, self.total_rows)
    }

    /// Whether the counter identity and the total bound both hold.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.processed_rows == self.successful_rows + self.failed_row_count
            && self.total_rows.is_none_or(|total| self.processed_rows <= total)
    }
}

/// Row counters local to one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub failed_row_count: u64,
}

/// Percent complete, `round(processed / total * 100)`, or `None` while the total
/// is unknown. Never exceeds 100.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percent_complete(processed: u64, total: Option<u64>) -> Option<u8> {
    let total = total?;
    if total == 0 {
        return Some(100);
    }
    let pct = (processed as f64 / total as f64 * 100.0).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

/// Throughput in rows per second.
///
/// Unavailable (`None`) unless the run is active, at least one second has
/// elapsed, and at least one row has been processed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rate_per_second(processed: u64, elapsed: Duration, running: bool) -> Option<f64> {
    if !running || processed == 0 || elapsed < Duration::from_secs(1) {
        return None;
    }
    Some(processed as f64 / elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(150, Some(200), Some(75))]
    #[case(200, Some(200), Some(100))]
    #[case(0, Some(200), Some(0))]
    #[case(1, Some(3), Some(33))]
    #[case(2, Some(3), Some(67))]
    #[case(0, Some(0), Some(100))]
    #[case(10, None, None)]
    fn percent_cases(#[case] processed: u64, #[case] total: Option<u64>, #[case] want: Option<u8>) {
        assert_eq!(percent_complete(processed, total), want);
    }

    #[test]
    fn counters_consistency() {
        let ok = JobCounters {
            total_rows: Some(200),
            processed_rows: 150,
            successful_rows: 149,
            failed_row_count: 1,
        };
        assert!(ok.is_consistent());
        assert_eq!(ok.percent_complete(), Some(75));

        let over = JobCounters {
            total_rows: Some(100),
            processed_rows: 101,
            successful_rows: 101,
            failed_row_count: 0,
        };
        assert!(!over.is_consistent());
    }

    #[test]
    fn percent_never_exceeds_hundred() {
        assert_eq!(percent_complete(250, Some(200)), Some(100));
    }

    #[test]
    fn rate_unavailable_before_one_second() {
        assert_eq!(rate_per_second(10, Duration::from_millis(999), true), None);
    }

    #[test]
    fn rate_unavailable_without_rows() {
        assert_eq!(rate_per_second(0, Duration::from_secs(5), true), None);
    }

    #[test]
    fn rate_unavailable_when_not_running() {
        assert_eq!(rate_per_second(10, Duration::from_secs(5), false), None);
    }

    #[test]
    fn rate_is_processed_over_elapsed() {
        let rate = rate_per_second(150, Duration::from_secs(60), true).unwrap();
        assert!((rate - 2.5).abs() < 1e-9);
    }
}
