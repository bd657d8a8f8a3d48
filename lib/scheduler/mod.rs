use std::error::Error as StdError;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid schedule {schedule:?}")]
    InvalidSchedule {
        schedule: String,
        #[source]
        source: JobSchedulerError,
    },

    #[error(transparent)]
    Scheduler(#[from] JobSchedulerError),

    #[error("initial {job} run failed")]
    EagerRun {
        job: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Runs `job` once immediately, then on every tick of `schedule` until `cancel` fires.
///
/// `schedule` uses six fields with seconds first. A failing first run aborts startup;
/// later failures are logged and the schedule keeps going. A tick that lands while the
/// previous run is still going is skipped.
pub async fn run_on_schedule<F, E>(
    job_name: &'static str,
    schedule: &str,
    job: F,
    cancel: &CancellationToken,
) -> Result<(), SchedulerError>
where
    F: Fn() -> BoxFuture<'static, Result<(), E>> + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let running = Arc::new(Mutex::new(()));

    let scheduled = {
        let job = job.clone();
        let running = running.clone();
        Job::new_async(schedule, move |_uuid, _l| {
            let job = job.clone();
            let running = running.clone();
            Box::pin(async move {
                let Ok(_guard) = running.try_lock() else {
                    warn!(
                        event = "scheduled_run_skipped",
                        job = job_name,
                        "previous run still in progress"
                    );
                    return;
                };
                info!(event = "scheduled_run_started", job = job_name, "scheduled run starting");
                if let Err(err) = job().await {
                    error!(
                        event = "scheduled_run_failed",
                        job = job_name,
                        error = %crate::logging::error_chain(&err),
                        "scheduled run failed"
                    );
                }
            })
        })
        .map_err(|source| SchedulerError::InvalidSchedule {
            schedule: schedule.to_string(),
            source,
        })?
    };

    info!(event = "eager_run_started", job = job_name, "running job once at startup");
    {
        let _guard = running.lock().await;
        job().await.map_err(|err| SchedulerError::EagerRun {
            job: job_name,
            source: Box::new(err),
        })?;
    }

    let mut sched = JobScheduler::new().await?;
    sched.add(scheduled).await?;
    sched.start().await?;
    info!(event = "schedule_registered", job = job_name, schedule, "job scheduled");

    cancel.cancelled().await;
    info!(event = "schedule_stopping", job = job_name, "stopping scheduler");
    sched.shutdown().await?;
    Ok(())
}
