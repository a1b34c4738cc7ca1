use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;
use toeristenbelasting_core::{
    publish_schedule_status, DailyScheduler, FileLedgerRepository, ScheduleStatusFile,
    TouristTaxService,
};
use tracing::{error, info, warn};

use crate::backend::StateBackend;

type Service = TouristTaxService<FileLedgerRepository>;

/// Loads the ledger, arms the daily trigger and serves signals until shutdown.
/// The schedule status is kept up to date in `status_file` for `status` to show.
pub async fn run(
    service: Arc<Service>,
    backend: StateBackend,
    status_file: ScheduleStatusFile,
) -> Result<()> {
    let days = service.reload().await;
    info!(
        days,
        total = service.total().await,
        zone = %service.config().home_zone,
        "Tourist tax daemon started"
    );

    let (stop_publisher, shutdown) = oneshot::channel();
    let publisher = tokio::spawn(publish_schedule_status(
        service.watch_schedule_status(),
        status_file,
        shutdown,
    ));
    let scheduler = DailyScheduler::new(Arc::clone(&service));
    scheduler.register();

    let result = serve_signals(&service, &scheduler, &backend).await;
    scheduler.stop();
    let _ = stop_publisher.send(());
    if let Err(e) = publisher.await {
        warn!(error = %e, "Status publisher did not finish");
    }
    info!("Tourist tax daemon stopped");
    result
}

async fn force_update(service: &Service) {
    match service.force_update().await {
        Ok(record) => info!(date = %record.date, amount = record.amount, "Manual update done"),
        Err(e) => error!(error = %e, "Manual update failed"),
    }
}

async fn reset(service: &Service) {
    if let Err(e) = service.reset().await {
        error!(error = %e, "Reset failed");
    }
}

async fn reload(service: &Service, scheduler: &DailyScheduler<FileLedgerRepository>, backend: &StateBackend) {
    if let Err(e) = backend.refresh() {
        warn!(error = %e, "Keeping previous entity states");
    }
    service.reload().await;
    scheduler.register();
}

#[cfg(unix)]
async fn serve_signals(
    service: &Service,
    scheduler: &DailyScheduler<FileLedgerRepository>,
    backend: &StateBackend,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut update = signal(SignalKind::user_defined1())?;
    let mut wipe = signal(SignalKind::user_defined2())?;
    info!("Signals: USR1 update, USR2 reset, HUP reload, TERM/INT stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = terminate.recv() => break,
            _ = update.recv() => force_update(service).await,
            _ = wipe.recv() => {
                warn!("Reset requested by signal");
                reset(service).await;
            }
            _ = hangup.recv() => {
                info!("Reload requested by signal");
                reload(service, scheduler, backend).await;
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn serve_signals(
    _service: &Service,
    _scheduler: &DailyScheduler<FileLedgerRepository>,
    _backend: &StateBackend,
) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
