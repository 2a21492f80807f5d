//! In-process daily scheduler

use std::future::Future;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{info, warn};

use crate::error::{DigestError, Result};

/// Parse an `HH:MM` time of day
pub fn parse_schedule_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| DigestError::Config(format!("Invalid schedule time '{}': expected HH:MM", value)))
}

/// First instant strictly after `now` whose UTC time of day is `at`
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Call `job` every day at `at` (UTC) until Ctrl-C.
///
/// A failing run is logged and the schedule continues.
pub async fn run_daily<F, Fut, T>(at: NaiveTime, run_on_startup: bool, job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    run_daily_until(at, run_on_startup, job, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Call `job` every day at `at` (UTC) until `shutdown` completes.
///
/// Shutdown is honored while waiting and while a run is in progress; an
/// interrupted run is dropped.
pub async fn run_daily_until<F, Fut, T, S>(at: NaiveTime, run_on_startup: bool, mut job: F, shutdown: S) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if run_on_startup {
        info!("Running on startup");
        tokio::select! {
            result = job() => {
                if let Err(e) = result {
                    warn!("Scheduled run failed: {}", e);
                }
            }
            _ = &mut shutdown => {
                info!("Scheduler stopped during a run");
                return Ok(());
            }
        }
    }

    loop {
        let now = Utc::now();
        let next = next_run_after(now, at);
        info!("Next run scheduled for {}", next.to_rfc3339());

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                info!("Scheduler stopped");
                return Ok(());
            }
        }

        tokio::select! {
            result = job() => {
                if let Err(e) = result {
                    warn!("Scheduled run failed: {}", e);
                }
            }
            _ = &mut shutdown => {
                info!("Scheduler stopped during a run");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 5, 3, 6, 59, 59).unwrap();
        assert_eq!(
            next_run_after(now, at(7, 0)),
            Utc.with_ymd_and_hms(2024, 5, 3, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 5, 3, 7, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(7, 0)),
            Utc.with_ymd_and_hms(2024, 5, 4, 7, 0, 0).unwrap()
        );

        let end_of_year = Utc.with_ymd_and_hms(2024, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(
            next_run_after(end_of_year, at(7, 0)),
            Utc.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_job() {
        let started = std::sync::atomic::AtomicUsize::new(0);
        let stop = tokio::time::sleep(std::time::Duration::from_millis(50));

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_daily_until(
                at(7, 0),
                true,
                || {
                    started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    std::future::pending::<Result<()>>()
                },
                stop,
            ),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(started.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting() {
        let mut runs = 0;
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_daily_until(
                at(7, 0),
                false,
                || {
                    runs += 1;
                    async { Ok::<_, DigestError>(()) }
                },
                async {},
            ),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(runs, 0);
    }

    #[test]
    fn test_parse_schedule_time() {
        assert_eq!(parse_schedule_time("07:00").unwrap(), at(7, 0));
        assert_eq!(parse_schedule_time(" 23:45 ").unwrap(), at(23, 45));
        assert!(parse_schedule_time("7am").is_err());
        assert!(parse_schedule_time("25:00").is_err());
    }
}
