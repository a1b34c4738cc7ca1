mod backend;
mod daemon;
mod homeassistant;
mod logging;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use toeristenbelasting_core::time::next_trigger_after;
use toeristenbelasting_core::{
    default_data_dir, resolve_update_time, FileLedgerRepository, ScheduleStatusFile, TaxConfig,
    TouristTaxService, CONFIG_FILE_NAME,
};

use crate::backend::StateBackend;

#[derive(Parser)]
#[command(name = "toeristenbelasting")]
#[command(about = "Keeps a daily tourist tax ledger from Home Assistant presence", long_about = None)]
struct Cli {
    /// Configuration file (default: <data-dir>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the ledger (default: ~/.toeristenbelasting)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the daily scheduler until stopped
    Run,
    /// Record today's tax now
    Update {
        /// Record under this day instead of today (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete every recorded day
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Show the total and the recorded days
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show when the next daily update runs
    Next,
    /// Write a configuration file with default values
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

struct Paths {
    data_dir: PathBuf,
    config: PathBuf,
}

impl Paths {
    fn resolve(cli: &Cli) -> Result<Self> {
        let data_dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        let config = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));
        Ok(Self { data_dir, config })
    }
}

fn build_service(
    config: TaxConfig,
    paths: &Paths,
    backend: &StateBackend,
) -> Arc<TouristTaxService<FileLedgerRepository>> {
    let repo = FileLedgerRepository::at(config.ledger_path(&paths.data_dir));
    Arc::new(TouristTaxService::new(config, Arc::new(repo), backend.source()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.log_dir.as_deref())?;
    let paths = Paths::resolve(&cli)?;

    if let Commands::InitConfig { force } = cli.command {
        if paths.config.exists() && !force {
            bail!(
                "{} already exists, use --force to overwrite",
                paths.config.display()
            );
        }
        TaxConfig::default()
            .save(&paths.config)
            .with_context(|| format!("Failed to write {}", paths.config.display()))?;
        println!("Wrote default configuration to {}", paths.config.display());
        return Ok(());
    }

    let config = TaxConfig::load(&paths.config)
        .with_context(|| format!("Failed to load configuration {}", paths.config.display()))?;

    match cli.command {
        Commands::Run => {
            let backend = StateBackend::from_config(&config)?;
            let status_file = ScheduleStatusFile::at(config.status_path(&paths.data_dir));
            let service = build_service(config, &paths, &backend);
            daemon::run(service, backend, status_file).await?;
        }
        Commands::Update { date } => {
            let backend = StateBackend::from_config(&config)?;
            let service = build_service(config, &paths, &backend);
            service.reload().await;
            let record = match date {
                Some(date) => service.update_day(date).await?,
                None => service.force_update().await?,
            };
            println!(
                "{}: {} in zone + {} guests = {} persons, € {:.2}",
                record.date, record.persons_in_zone, record.guests, record.total_persons, record.amount
            );
            println!("Total: € {:.2}", service.total().await);
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("Reset deletes every recorded day; pass --yes to confirm");
            }
            let backend = StateBackend::empty();
            let service = build_service(config, &paths, &backend);
            service.reload().await;
            service.reset().await?;
            println!("Tourist tax data reset.");
        }
        Commands::Status { json } => {
            let backend = StateBackend::empty();
            let status_file = ScheduleStatusFile::at(config.status_path(&paths.data_dir));
            let service = build_service(config, &paths, &backend);
            service.reload().await;
            match status_file.load() {
                Ok(Some(schedule)) => service.set_schedule_status(schedule),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable status file"),
            }
            let attributes = service.attributes().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&attributes)?);
            } else {
                status::show_status(&attributes);
            }
        }
        Commands::Next => {
            let backend = StateBackend::from_config(&config)?;
            let at = resolve_update_time(&config, backend.source().as_ref()).await?;
            match next_trigger_after(&Local::now(), None, at) {
                Some(next) => println!(
                    "Daily update at {}, next run {}",
                    at.format("%H:%M:%S"),
                    next.format("%Y-%m-%d %H:%M:%S %:z")
                ),
                None => bail!("No valid local time for {} in the coming days", at),
            }
        }
        Commands::InitConfig { .. } => {}
    }
    Ok(())
}
