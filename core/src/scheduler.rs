use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::TaxConfig;
use crate::error::{Result, TaxError};
use crate::repository::{LedgerRepository, ScheduleStatusFile};
use crate::service::TouristTaxService;
use crate::state::StateSource;
use crate::time::{duration_until, next_trigger_after, parse_time_of_day};

/// Wait before asking an unavailable time source again.
pub const TIME_SOURCE_RETRY: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    NotScheduled,
    WaitingForTimeSource {
        reason: String,
        retry_at: DateTime<Local>,
    },
    Scheduled {
        update_time: NaiveTime,
        next_run: DateTime<Local>,
    },
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Time of day for the daily update: the time entity when configured, else `update_time`.
pub async fn resolve_update_time(config: &TaxConfig, source: &dyn StateSource) -> Result<NaiveTime> {
    let Some(entity_id) = config.update_time_entity.as_deref() else {
        return config.default_update_time();
    };
    let entity = source
        .get_state(entity_id)
        .await?
        .ok_or_else(|| TaxError::TimeSourceUnavailable(format!("{} not found", entity_id)))?;
    if !entity.is_available() {
        return Err(TaxError::TimeSourceUnavailable(format!(
            "{} is {}",
            entity_id, entity.state
        )));
    }
    parse_time_of_day(&entity.state).map_err(|_| {
        TaxError::TimeSourceUnavailable(format!("{} has unusable time '{}'", entity_id, entity.state))
    })
}

/// Keeps exactly one daily trigger armed for a service.
pub struct DailyScheduler<R: LedgerRepository + 'static> {
    service: Arc<TouristTaxService<R>>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: LedgerRepository + 'static> DailyScheduler<R> {
    pub fn new(service: Arc<TouristTaxService<R>>) -> Self {
        Self {
            service,
            clock: Arc::new(SystemClock),
            retry_delay: TIME_SOURCE_RETRY,
            handle: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Arms the daily trigger, cancelling the previous one first.
    pub fn register(&self) {
        let binding = Binding {
            service: Arc::clone(&self.service),
            clock: Arc::clone(&self.clock),
            retry_delay: self.retry_delay,
        };

        let mut handle = match self.handle.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = handle.take() {
            debug!("Cancelling previous daily trigger");
            old.abort();
        }
        *handle = Some(tokio::spawn(binding.run()));
        info!("Daily trigger registered");
    }

    pub fn stop(&self) {
        let mut handle = match self.handle.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = handle.take() {
            old.abort();
            info!("Daily trigger stopped");
        }
        self.service.set_schedule_status(ScheduleStatus::NotScheduled);
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl<R: LedgerRepository + 'static> Drop for DailyScheduler<R> {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(old) = handle.take() {
                old.abort();
            }
        }
    }
}

async fn write_status(file: &ScheduleStatusFile, status: ScheduleStatus) {
    let target = file.clone();
    match tokio::task::spawn_blocking(move || target.save(&status)).await {
        Ok(Ok(())) => debug!(path = %file.path().display(), "Schedule status published"),
        Ok(Err(e)) => warn!(error = %e, "Publishing schedule status failed"),
        Err(e) => warn!(error = %e, "Publishing schedule status failed"),
    }
}

/// Writes every schedule status change to `file`. On `shutdown` the latest status is
/// written once more and the task ends.
pub async fn publish_schedule_status(
    mut statuses: watch::Receiver<ScheduleStatus>,
    file: ScheduleStatusFile,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let status = statuses.borrow_and_update().clone();
        write_status(&file, status).await;

        tokio::select! {
            changed = statuses.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut shutdown => {
                let status = statuses.borrow_and_update().clone();
                write_status(&file, status).await;
                break;
            }
        }
    }
}

struct Binding<R: LedgerRepository + 'static> {
    service: Arc<TouristTaxService<R>>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
}

impl<R: LedgerRepository + 'static> Binding<R> {
    async fn resolve(&self) -> Result<NaiveTime> {
        resolve_update_time(self.service.config(), self.service.source()).await
    }

    async fn wait_for_time_source(&self, reason: String) {
        let retry_at = self.clock.now()
            + chrono::Duration::from_std(self.retry_delay).unwrap_or(chrono::Duration::seconds(30));
        warn!(%reason, retry_in_secs = self.retry_delay.as_secs(), "Update time not available, retrying");
        self.service
            .set_schedule_status(ScheduleStatus::WaitingForTimeSource { reason, retry_at });
        sleep(self.retry_delay).await;
    }

    async fn run(self) {
        let poll_interval = Duration::from_secs(self.service.config().time_poll_interval_secs.max(1));
        let mut last_fired: Option<DateTime<Local>> = None;

        'arm: loop {
            let update_time = match self.resolve().await {
                Ok(at) => at,
                Err(e) => {
                    self.wait_for_time_source(e.to_string()).await;
                    continue 'arm;
                }
            };

            let now = self.clock.now();
            let Some(next_run) = next_trigger_after(&now, last_fired.as_ref(), update_time) else {
                error!(%update_time, "Failed to calculate next run time");
                self.wait_for_time_source(format!("no valid local time for {}", update_time))
                    .await;
                continue 'arm;
            };

            self.service.set_schedule_status(ScheduleStatus::Scheduled {
                update_time,
                next_run,
            });
            info!(
                next_run = %next_run.format("%Y-%m-%d %H:%M:%S"),
                in_secs = duration_until(&now, &next_run).as_secs(),
                "Next tourist tax update scheduled"
            );

            loop {
                let remaining = duration_until(&self.clock.now(), &next_run);
                if remaining <= poll_interval {
                    sleep(remaining).await;
                    break;
                }
                sleep(poll_interval).await;

                match self.resolve().await {
                    Ok(at) if at != update_time => {
                        info!(old = %update_time, new = %at, "Update time changed, re-arming");
                        continue 'arm;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "Time source check failed, keeping current schedule"),
                }
            }

            last_fired = Some(next_run);
            info!(at = %next_run.format("%Y-%m-%d %H:%M:%S"), "Running scheduled tourist tax update");
            if let Err(e) = self.service.daily_update(Some(next_run)).await {
                debug!(error = %e, "Scheduled update failed, waiting for the next day");
            }
        }
    }
}
