//! Daily trigger.
//!
//! Once a day, at a configured local time, every identifier on the watchlist
//! is run through a fresh job. Reconfiguring adds a new scheduled job and
//! then removes the old one.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::config::ScheduleConfig;
use crate::models::job::Job;
use crate::services::orchestrator::{JobError, Orchestrator};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid time of day {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
}

/// Checks the time of day and resolves the timezone.
pub fn parse_schedule(schedule: &ScheduleConfig) -> Result<Tz, ScheduleError> {
    if schedule.hour > 23 || schedule.minute > 59 {
        return Err(ScheduleError::InvalidTime {
            hour: schedule.hour,
            minute: schedule.minute,
        });
    }

    schedule
        .timezone
        .parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(schedule.timezone.clone()))
}

pub fn daily_job_name(now: DateTime<Utc>, timezone: Tz) -> String {
    format!(
        "Daily Price Report - {} ({})",
        now.with_timezone(&timezone).format("%Y-%m-%d %H:%M"),
        timezone.name()
    )
}

/// Creates and processes the daily job. Returns `None` when the watchlist is empty.
pub async fn run_daily(
    orchestrator: &Orchestrator,
    timezone: Tz,
    created_by: Option<&str>,
) -> Result<Option<Job>, JobError> {
    let identifiers = orchestrator.store().watchlist().await?;
    if identifiers.is_empty() {
        tracing::warn!("Watchlist is empty, skipping daily report");
        return Ok(None);
    }

    let name = daily_job_name(Utc::now(), timezone);
    let job = orchestrator
        .create_job(&name, &identifiers, created_by)
        .await?;

    tracing::info!(job_id = %job.id, identifiers = identifiers.len(), "Starting daily job");
    orchestrator.process_job(job.id).await?;

    Ok(Some(job))
}

/// Owns the cron job that fires [`run_daily`].
pub struct DailyTrigger {
    scheduler: JobScheduler,
    orchestrator: Orchestrator,
    system_user: Option<String>,
    current: Mutex<Option<(Uuid, ScheduleConfig)>>,
}

impl DailyTrigger {
    pub async fn new(
        orchestrator: Orchestrator,
        system_user: Option<String>,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            scheduler: JobScheduler::new().await?,
            orchestrator,
            system_user,
            current: Mutex::new(None),
        })
    }

    /// Schedules the daily run and starts the scheduler.
    pub async fn start(&self, schedule: ScheduleConfig) -> Result<(), ScheduleError> {
        self.reschedule(schedule).await?;
        self.scheduler.start().await?;
        Ok(())
    }

    /// Replaces the scheduled run. The previous schedule stays in place on error.
    pub async fn reschedule(&self, schedule: ScheduleConfig) -> Result<(), ScheduleError> {
        let timezone = parse_schedule(&schedule)?;
        let job = self.cron_job(&schedule, timezone)?;

        let mut current = self.current.lock().await;
        let job_id = self.scheduler.add(job).await?;
        if let Some((old_id, _)) = current.as_ref() {
            if let Err(e) = self.scheduler.remove(old_id).await {
                if let Err(cleanup) = self.scheduler.remove(&job_id).await {
                    tracing::error!(error = %cleanup, "Failed to drop replacement schedule");
                }
                return Err(e.into());
            }
        }

        tracing::info!(
            hour = schedule.hour,
            minute = schedule.minute,
            timezone = %schedule.timezone,
            "Daily report scheduled"
        );
        *current = Some((job_id, schedule));
        Ok(())
    }

    pub async fn current(&self) -> Option<ScheduleConfig> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|(_, schedule)| schedule.clone())
    }

    /// When the daily run fires next, if the scheduler knows.
    pub async fn next_run(&self) -> Option<DateTime<Utc>> {
        let job_id = self.current.lock().await.as_ref().map(|(id, _)| *id)?;

        let mut scheduler = self.scheduler.clone();
        match scheduler.next_tick_for_job(job_id).await {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up next daily run");
                None
            }
        }
    }

    fn cron_job(&self, schedule: &ScheduleConfig, timezone: Tz) -> Result<CronJob, ScheduleError> {
        let orchestrator = self.orchestrator.clone();
        let system_user = self.system_user.clone();

        let job = CronJob::new_async_tz(
            schedule.cron_expression().as_str(),
            timezone,
            move |_uuid, _lock| {
                let orchestrator = orchestrator.clone();
                let system_user = system_user.clone();
                Box::pin(async move {
                    if let Err(e) = run_daily(&orchestrator, timezone, system_user.as_deref()).await {
                        tracing::error!(error = %e, "Daily report run failed");
                    }
                })
            },
        )?;

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::db::memory::MemoryJobStore;
    use crate::db::JobStore;
    use crate::models::job::JobStatus;
    use crate::services::notifier::LogNotifier;
    use crate::services::product_client::{ProductApiError, ProductSource};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct EmptySource;

    #[async_trait]
    impl ProductSource for EmptySource {
        async fn fetch(&self, _identifier: &str) -> Result<Option<serde_json::Value>, ProductApiError> {
            Ok(None)
        }
    }

    fn orchestrator(store: Arc<MemoryJobStore>) -> Orchestrator {
        Orchestrator::new(
            store,
            Arc::new(EmptySource),
            Arc::new(LogNotifier),
            ProcessingConfig {
                batch_size: 2,
                inter_batch_delay: Duration::ZERO,
                history_days: 30,
                job_lease: Duration::from_secs(600),
            },
        )
    }

    fn schedule(hour: u32, minute: u32, timezone: &str) -> ScheduleConfig {
        ScheduleConfig {
            hour,
            minute,
            timezone: timezone.to_string(),
        }
    }

    #[test]
    fn test_parse_schedule() {
        assert_eq!(
            parse_schedule(&schedule(20, 0, "Asia/Taipei")).unwrap(),
            chrono_tz::Asia::Taipei
        );
        assert!(matches!(
            parse_schedule(&schedule(24, 0, "Asia/Taipei")),
            Err(ScheduleError::InvalidTime { .. })
        ));
        assert!(matches!(
            parse_schedule(&schedule(8, 0, "Mars/Olympus")),
            Err(ScheduleError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_daily_job_name_uses_local_time() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            daily_job_name(now, chrono_tz::Asia::Taipei),
            "Daily Price Report - 2026-03-01 20:00 (Asia/Taipei)"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reschedule_replaces_trigger() {
        let store = Arc::new(MemoryJobStore::new());
        let trigger = DailyTrigger::new(orchestrator(store), None).await.unwrap();
        trigger.start(schedule(20, 0, "Asia/Taipei")).await.unwrap();

        let next = trigger.next_run().await.expect("next run is known");
        assert!(next > Utc::now());

        let rejected = trigger.reschedule(schedule(8, 30, "Mars/Olympus")).await;
        assert!(matches!(rejected, Err(ScheduleError::InvalidTimezone(_))));
        assert_eq!(trigger.current().await, Some(schedule(20, 0, "Asia/Taipei")));

        trigger.reschedule(schedule(8, 30, "UTC")).await.unwrap();
        assert_eq!(trigger.current().await, Some(schedule(8, 30, "UTC")));
        assert!(trigger.next_run().await.is_some());
    }

    #[tokio::test]
    async fn test_empty_watchlist_creates_no_job() {
        let store = Arc::new(MemoryJobStore::new());
        let result = run_daily(&orchestrator(store.clone()), chrono_tz::UTC, None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.job_count(), 0);
    }

    #[tokio::test]
    async fn test_daily_run_processes_watchlist() {
        let store = Arc::new(MemoryJobStore::new());
        store
            .add_to_watchlist(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        let job = run_daily(&orchestrator(store.clone()), chrono_tz::UTC, Some("system"))
            .await
            .unwrap()
            .unwrap();

        assert!(job.name.starts_with("Daily Price Report - "));
        assert_eq!(job.total_batches, 2);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.created_by.as_deref(), Some("system"));
    }
}
