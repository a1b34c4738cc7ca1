use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::config::TaxConfig;
use crate::error::{Result, TaxError};
use crate::model::day_record::DayRecord;
use crate::model::ledger::{Ledger, LedgerSnapshot};
use crate::presence::{count_persons_in_zone, read_guests};
use crate::repository::LedgerRepository;
use crate::scheduler::ScheduleStatus;
use crate::service::attributes::SensorAttributes;
use crate::state::StateSource;

pub const LOAD_ATTEMPTS: usize = 3;
pub const LOAD_RETRY_DELAY: Duration = Duration::from_secs(1);

struct LedgerState {
    ledger: Ledger,
    /// Recorded in memory but not yet stored; replayed on the next write.
    unsaved: BTreeMap<NaiveDate, DayRecord>,
}

/// Owns the in-memory ledger. Every mutation goes through the state mutex, so
/// scheduled updates, forced updates, resets and reloads never interleave. Writes
/// start from the stored ledger, so changes made by other processes are kept.
pub struct TouristTaxService<R: LedgerRepository + 'static> {
    config: TaxConfig,
    repo: Arc<R>,
    source: Arc<dyn StateSource>,
    state: Mutex<LedgerState>,
    schedule_status: watch::Sender<ScheduleStatus>,
    load_attempts: usize,
    load_retry_delay: Duration,
}

impl<R: LedgerRepository + 'static> TouristTaxService<R> {
    pub fn new(config: TaxConfig, repo: Arc<R>, source: Arc<dyn StateSource>) -> Self {
        let ledger = Ledger::new(config.total_policy);
        let (schedule_status, _) = watch::channel(ScheduleStatus::default());
        Self {
            config,
            repo,
            source,
            state: Mutex::new(LedgerState {
                ledger,
                unsaved: BTreeMap::new(),
            }),
            schedule_status,
            load_attempts: LOAD_ATTEMPTS,
            load_retry_delay: LOAD_RETRY_DELAY,
        }
    }

    pub fn with_load_retry(mut self, attempts: usize, delay: Duration) -> Self {
        self.load_attempts = attempts.max(1);
        self.load_retry_delay = delay;
        self
    }

    pub fn config(&self) -> &TaxConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn StateSource {
        self.source.as_ref()
    }

    pub fn schedule_status(&self) -> ScheduleStatus {
        self.schedule_status.borrow().clone()
    }

    pub fn set_schedule_status(&self, status: ScheduleStatus) {
        self.schedule_status.send_replace(status);
    }

    /// Receiver that sees every schedule status change.
    pub fn watch_schedule_status(&self) -> watch::Receiver<ScheduleStatus> {
        self.schedule_status.subscribe()
    }

    /// Replaces the in-memory ledger with what is on disk. Unreadable data is
    /// retried a bounded number of times, then treated as an empty ledger.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> usize {
        let mut state = self.state.lock().await;
        let snapshot = match self.load_with_retry().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Could not read ledger, starting empty");
                LedgerSnapshot::default()
            }
        };

        let stored_total = snapshot.total;
        let mut ledger = Ledger::from_snapshot(snapshot, self.config.total_policy);
        if (ledger.total() - stored_total).abs() > 0.005 {
            warn!(
                stored = stored_total,
                recomputed = ledger.total(),
                "Stored total did not match the recorded days, using recomputed total"
            );
        }
        for record in state.unsaved.values() {
            ledger.upsert(record.clone());
        }
        info!(days = ledger.len(), total = ledger.total(), "Ledger loaded");
        state.ledger = ledger;
        state.ledger.len()
    }

    async fn load_with_retry(&self) -> Result<LedgerSnapshot> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let repo = Arc::clone(&self.repo);
            let result = tokio::task::spawn_blocking(move || repo.load())
                .await
                .map_err(|e| TaxError::Task(e.to_string()))?;

            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_retryable() && attempt < self.load_attempts => {
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.load_attempts,
                        "Reading ledger failed, retrying"
                    );
                    tokio::time::sleep(self.load_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn modify<F>(&self, apply: F) -> Result<LedgerSnapshot>
    where
        F: FnOnce(Option<LedgerSnapshot>) -> LedgerSnapshot + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.modify(apply))
            .await
            .map_err(|e| TaxError::Task(e.to_string()))?
    }

    /// Reads presence and guests for `date` without touching the ledger.
    async fn measure(&self, date: NaiveDate) -> Result<DayRecord> {
        let persons = count_persons_in_zone(
            self.source.as_ref(),
            &self.config.home_zone,
            &self.config.tracked_entities,
        )
        .await?;
        let guests = read_guests(self.source.as_ref(), self.config.guest_entity.as_deref()).await?;
        Ok(DayRecord::new(date, persons, guests, self.config.price_per_person))
    }

    /// The daily update: count, compute, record under the day of `now` (default: now), persist.
    pub async fn daily_update(&self, now: Option<DateTime<Local>>) -> Result<DayRecord> {
        let now = now.unwrap_or_else(Local::now);
        self.update_day(now.date_naive()).await
    }

    /// Manual trigger for the same routine the scheduler runs.
    pub async fn force_update(&self) -> Result<DayRecord> {
        info!("Forced tourist tax update");
        self.daily_update(None).await
    }

    #[instrument(skip(self))]
    pub async fn update_day(&self, date: NaiveDate) -> Result<DayRecord> {
        let mut state = self.state.lock().await;

        let record = match self.measure(date).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Reading presence failed, ledger unchanged");
                return Err(e);
            }
        };
        if record.is_empty() {
            debug!("Nobody present, recording a zero day");
        }

        let policy = self.config.total_policy;
        let now = Local::now();
        let mut pending = state.unsaved.clone();
        pending.insert(record.date, record.clone());
        let fallback = state.ledger.clone();
        let to_apply = pending.clone();

        let result = self
            .modify(move |stored| {
                let mut ledger = match stored {
                    Some(snapshot) => Ledger::from_snapshot(snapshot, policy),
                    None => fallback,
                };
                for record in to_apply.into_values() {
                    ledger.upsert(record);
                }
                ledger.touch(now);
                ledger.to_snapshot()
            })
            .await;

        match result {
            Ok(snapshot) => {
                state.ledger = Ledger::from_snapshot(snapshot, policy);
                state.unsaved.clear();
                info!(
                    persons = record.persons_in_zone,
                    guests = record.guests,
                    amount = record.amount,
                    total = state.ledger.total(),
                    "Recorded tourist tax"
                );
                Ok(record)
            }
            Err(e) => {
                // Kept in memory; the next successful write stores it.
                for record in pending.values() {
                    state.ledger.upsert(record.clone());
                }
                state.ledger.touch(now);
                state.unsaved = pending;
                error!(error = %e, "Saving ledger failed, previous file left intact");
                Err(e)
            }
        }
    }

    /// Clears every day. Only takes effect in memory once it is on disk.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let policy = self.config.total_policy;
        let now = Local::now();

        let result = self
            .modify(move |_| {
                let mut cleared = Ledger::new(policy);
                cleared.touch(now);
                cleared.to_snapshot()
            })
            .await;

        match result {
            Ok(snapshot) => {
                let removed = state.ledger.len();
                state.ledger = Ledger::from_snapshot(snapshot, policy);
                state.unsaved.clear();
                info!(removed, "Tourist tax data reset");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Saving reset ledger failed, data kept");
                Err(e)
            }
        }
    }

    pub async fn total(&self) -> f64 {
        self.state.lock().await.ledger.total()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.ledger.to_snapshot()
    }

    pub async fn attributes(&self) -> SensorAttributes {
        let state = self.state.lock().await;
        SensorAttributes::from_ledger(&state.ledger, &self.config, self.schedule_status())
    }
}
