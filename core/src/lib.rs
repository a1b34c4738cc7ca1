pub mod config;
pub mod error;
pub mod model;
pub mod presence;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod time;

pub use config::{default_data_dir, HomeAssistantConfig, TaxConfig, CONFIG_FILE_NAME};
pub use error::{Result, TaxError};
pub use model::day_record::DayRecord;
pub use model::ledger::{Ledger, LedgerSnapshot, TotalPolicy};
pub use model::stats::MonthSummary;
pub use repository::{FileLedgerRepository, LedgerRepository, ScheduleStatusFile};
pub use scheduler::{publish_schedule_status, resolve_update_time, DailyScheduler, ScheduleStatus};
pub use service::{SensorAttributes, TouristTaxService};
pub use state::{EntityState, MemoryStateSource, StateSource};
