use chrono::Utc;
use ferry_core::entities::Job;
use ferry_core::enums::JobStatus;
use ferry_core::progress::rate_per_second;
use ferry_db::store::FerryStore;

/// Human form of a rate: rows/sec at or above one row per second, otherwise
/// rows/min. `None` while the rate is unavailable.
#[must_use]
pub fn format_rate(rows_per_second: Option<f64>) -> Option<String> {
    let rate = rows_per_second?;
    if rate >= 1.0 {
        Some(format!("{rate:.1} rows/sec"))
    } else {
        Some(format!("{:.1} rows/min", rate * 60.0))
    }
}

/// Rate of a running job as seen from its last checkpoint.
///
/// Used when the engine runs in another process; only checkpointed rows of the
/// current run count.
pub async fn checkpointed_rate(store: &FerryStore, job: &Job) -> anyhow::Result<Option<f64>> {
    if job.status != JobStatus::Running {
        return Ok(None);
    }
    let Some(run_id) = job.current_run_id.as_deref() else {
        return Ok(None);
    };
    let run = store.get_run(run_id).await?;
    let Some(started_at) = run.started_at else {
        return Ok(None);
    };
    let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
    Ok(rate_per_second(run.processed_rows, elapsed, true))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::format_rate;

    #[test]
    fn fast_rates_use_rows_per_second() {
        assert_eq!(format_rate(Some(42.04)).as_deref(), Some("42.0 rows/sec"));
        assert_eq!(format_rate(Some(1.0)).as_deref(), Some("1.0 rows/sec"));
    }

    #[test]
    fn slow_rates_use_rows_per_minute() {
        assert_eq!(format_rate(Some(0.5)).as_deref(), Some("30.0 rows/min"));
        assert_eq!(format_rate(Some(0.02)).as_deref(), Some("1.2 rows/min"));
    }

    #[test]
    fn unavailable_rate_renders_nothing() {
        assert_eq!(format_rate(None), None);
    }
}
