// Wall-clock scheduling for the daily posters and fixed-interval loops for
// the pollers. Every wait point observes the shared cancellation token.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Civil timezone the clan plays in.
pub const CLAN_TIMEZONE: Tz = chrono_tz::America::New_York;

/// A time of day in a fixed civil timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySchedule {
    pub timezone: Tz,
    pub at: NaiveTime,
}

impl DailySchedule {
    pub fn new(timezone: Tz, at: NaiveTime) -> Self {
        Self { timezone, at }
    }

    /// The first instant strictly after `now` whose wall-clock time in
    /// `timezone` is `at`. A `now` exactly on the target rolls to tomorrow.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.timezone).date_naive();
        let target = at_local_time(&self.timezone, today, self.at);
        if now < target {
            return target;
        }
        let tomorrow = today + Days::new(1);
        at_local_time(&self.timezone, tomorrow, self.at)
    }
}

fn at_local_time<T: TimeZone>(tz: &T, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => {
            // Wall-clock time skipped by a DST jump: keep the pre-jump offset.
            let offset = tz.offset_from_utc_datetime(&naive).fix();
            (naive - chrono::Duration::seconds(offset.local_minus_utc() as i64)).and_utc()
        }
    }
}

/// Work fired once per day by [`run_daily`].
#[async_trait]
pub trait DailyJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// `now` is the trigger instant, not the possibly later wake-up time.
    async fn run(&self, now: DateTime<Utc>) -> Result<(), Error>;
}

/// Await the next trigger, run the job, repeat; return once `cancel` fires
/// while waiting. Job failures are logged and never end the loop.
pub async fn run_daily<J: DailyJob>(schedule: DailySchedule, job: J, cancel: CancellationToken) {
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(
            job = job.name(),
            next = %next.to_rfc3339(),
            wait_secs = wait.as_secs(),
            "Next scheduled run"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job = job.name(), "Cancelled, stopping scheduler");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if let Err(e) = job.run(next).await {
            tracing::error!(job = job.name(), "Scheduled run failed: {e}");
        }
    }
}

/// Call `tick` immediately and then every `period` until cancelled. A slow
/// tick delays the next one rather than bunching missed ticks together.
pub async fn run_every<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(task = name, "Cancelled, stopping");
                return;
            }
            _ = interval.tick() => {}
        }
        tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn ten_am_eastern() -> DailySchedule {
        DailySchedule::new(CLAN_TIMEZONE, NaiveTime::from_hms_opt(10, 0, 0).unwrap())
    }

    #[test]
    fn test_before_target_same_day() {
        // 14:00 UTC is 09:00 EST.
        let next = ten_am_eastern().next_after(utc(2025, 1, 15, 14, 0));
        let eastern = next.with_timezone(&CLAN_TIMEZONE);
        assert_eq!(eastern.day(), 15);
        assert_eq!(eastern.hour(), 10);
        assert_eq!(next, utc(2025, 1, 15, 15, 0));
    }

    #[test]
    fn test_exactly_on_target_rolls_to_tomorrow() {
        let next = ten_am_eastern().next_after(utc(2025, 1, 15, 15, 0));
        assert_eq!(next, utc(2025, 1, 16, 15, 0));
    }

    #[test]
    fn test_after_target_rolls_to_tomorrow() {
        let next = ten_am_eastern().next_after(utc(2025, 1, 15, 17, 0));
        let eastern = next.with_timezone(&CLAN_TIMEZONE);
        assert_eq!(eastern.day(), 16);
        assert_eq!(eastern.hour(), 10);
    }

    #[test]
    fn test_summer_time_offset() {
        // EDT is UTC-4, so 10:00 local is 14:00 UTC.
        let next = ten_am_eastern().next_after(utc(2025, 7, 1, 12, 0));
        assert_eq!(next, utc(2025, 7, 1, 14, 0));
    }

    #[test]
    fn test_across_dst_change_keeps_wall_clock() {
        // 2025-03-09 is the spring-forward day in New York.
        let next = ten_am_eastern().next_after(utc(2025, 3, 8, 16, 0));
        assert_eq!(next, utc(2025, 3, 9, 14, 0));
        assert_eq!(next.with_timezone(&CLAN_TIMEZONE).hour(), 10);
    }

    #[test]
    fn test_skipped_local_time_resolves() {
        let schedule = DailySchedule::new(CLAN_TIMEZONE, NaiveTime::from_hms_opt(2, 30, 0).unwrap());
        let next = schedule.next_after(utc(2025, 3, 9, 0, 0));
        // 02:30 does not exist that morning; the pre-jump offset (UTC-5) is used.
        assert_eq!(next, utc(2025, 3, 9, 7, 30));
    }

    #[test]
    fn test_utc_midnight() {
        let schedule = DailySchedule::new(chrono_tz::UTC, NaiveTime::MIN);
        let next = schedule.next_after(utc(2025, 1, 19, 23, 59));
        assert_eq!(next, utc(2025, 1, 20, 0, 0));
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(schedule.next_after(next), utc(2025, 1, 21, 0, 0));
    }

    #[tokio::test]
    async fn test_run_every_ticks_immediately_and_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let task = {
            let cancel = cancel.clone();
            let ticks = ticks.clone();
            tokio::spawn(run_every("test", Duration::from_secs(3600), cancel, move || {
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    struct CountingJob(Arc<AtomicU32>);

    #[async_trait]
    impl DailyJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_daily_terminates_while_waiting() {
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicU32::new(0));
        let task = tokio::spawn(run_daily(
            ten_am_eastern(),
            CountingJob(runs.clone()),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    struct RecordingJob {
        runs: Arc<Mutex<Vec<DateTime<Utc>>>>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl DailyJob for RecordingJob {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn run(&self, now: DateTime<Utc>) -> Result<(), Error> {
            self.runs.lock().unwrap().push(now);
            self.cancel.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_daily_passes_the_scheduled_instant() {
        let target = Utc::now() + chrono::Duration::milliseconds(1500);
        let schedule = DailySchedule::new(chrono_tz::UTC, target.time());
        let expected = schedule.next_after(Utc::now());

        let cancel = CancellationToken::new();
        let runs = Arc::new(Mutex::new(Vec::new()));
        let job = RecordingJob { runs: runs.clone(), cancel: cancel.clone() };

        tokio::time::timeout(Duration::from_secs(5), run_daily(schedule, job, cancel))
            .await
            .expect("job never fired");

        // The wake-up is late by some amount; the job still sees the trigger.
        assert_eq!(*runs.lock().unwrap(), vec![expected]);
    }
}
